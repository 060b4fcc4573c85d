//! Tests for EventSub subscription bootstrap.

use super::*;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> BootstrapConfig {
    BootstrapConfig {
        client_id: "client-123".to_string(),
        client_secret: "client-secret-value".to_string(),
        broadcaster_user_id: "1001".to_string(),
        callback_url: "https://relay.example.com/eventsub/callback".to_string(),
        eventsub_secret: "shared-secret-value".to_string(),
        token_url: format!("{}/oauth2/token", server.uri()),
        subscriptions_url: format!("{}/helix/eventsub/subscriptions", server.uri()),
        timeout: Duration::from_secs(5),
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "app-token",
            "expires_in": 3600,
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

fn created(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(202).set_body_json(json!({
        "data": [{"id": id, "status": "webhook_callback_verification_pending"}],
        "total": 1
    }))
}

mod topic_tests {
    use super::*;

    /// Four topics, follow on v2 and the rest on v1.
    #[test]
    fn test_default_topics() {
        let topics: Vec<String> = default_topics().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            topics,
            vec![
                "channel.follow v2",
                "channel.subscribe v1",
                "channel.subscription.gift v1",
                "channel.cheer v1",
            ]
        );
    }

    /// Follow v2 carries a moderator id; other topics only the broadcaster.
    #[test]
    fn test_conditions() {
        let topics = default_topics();
        assert_eq!(
            topics[0].condition("42"),
            json!({"broadcaster_user_id": "42", "moderator_user_id": "42"})
        );
        assert_eq!(topics[3].condition("42"), json!({"broadcaster_user_id": "42"}));
    }
}

mod config_tests {
    use super::*;

    /// Plain-http callbacks are refused.
    #[tokio::test]
    async fn test_http_callback_rejected() {
        let server = MockServer::start().await;
        let mut config = config(&server);
        config.callback_url = "http://relay.example.com/eventsub/callback".to_string();
        assert!(matches!(
            EventSubBootstrapper::new(config),
            Err(BootstrapError::InvalidConfig(_))
        ));
    }

    /// Missing credentials are refused.
    #[tokio::test]
    async fn test_missing_client_id_rejected() {
        let server = MockServer::start().await;
        let mut config = config(&server);
        config.client_id = " ".to_string();
        let error = EventSubBootstrapper::new(config).unwrap_err();
        assert!(error.to_string().contains("client_id"));
    }

    /// Secrets never appear in Debug output.
    #[tokio::test]
    async fn test_debug_redacts_secrets() {
        let server = MockServer::start().await;
        let debug = format!("{:?}", config(&server));
        assert!(!debug.contains("client-secret-value"));
        assert!(!debug.contains("shared-secret-value"));
    }
}

mod request_tests {
    use super::*;

    /// The token exchange uses the client-credentials grant.
    #[tokio::test]
    async fn test_fetch_app_token() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        let bootstrapper = EventSubBootstrapper::new(config(&server)).unwrap();
        let token = bootstrapper.fetch_app_token().await.unwrap();

        assert_eq!(token.access_token, "app-token");
        assert_eq!(token.expires_in, Some(3600));
    }

    /// A rejected token request carries its status.
    #[tokio::test]
    async fn test_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid client"))
            .mount(&server)
            .await;

        let bootstrapper = EventSubBootstrapper::new(config(&server)).unwrap();
        let result = bootstrapper.subscribe_all().await;
        assert!(matches!(
            result,
            Err(BootstrapError::TokenRejected { status: 400, .. })
        ));
    }

    /// A subscription request carries auth headers, condition and webhook transport.
    #[tokio::test]
    async fn test_subscribe_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .and(header("authorization", "Bearer app-token"))
            .and(header("client-id", "client-123"))
            .and(body_partial_json(json!({
                "type": "channel.cheer",
                "version": "1",
                "condition": {"broadcaster_user_id": "1001"},
                "transport": {
                    "method": "webhook",
                    "callback": "https://relay.example.com/eventsub/callback",
                    "secret": "shared-secret-value"
                }
            })))
            .respond_with(created("sub-1"))
            .expect(1)
            .mount(&server)
            .await;

        let bootstrapper = EventSubBootstrapper::new(config(&server)).unwrap();
        let token = AppToken {
            access_token: "app-token".to_string(),
            expires_in: None,
        };
        let topic = default_topics().remove(3);
        let created = bootstrapper.subscribe(&topic, &token).await.unwrap();

        assert_eq!(
            created,
            CreatedSubscription {
                id: "sub-1".to_string(),
                status: "webhook_callback_verification_pending".to_string(),
            }
        );
    }

    /// One rejected topic does not stop the others.
    #[tokio::test]
    async fn test_subscribe_all_continues_after_rejection() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .and(body_partial_json(json!({"type": "channel.subscribe"})))
            .respond_with(ResponseTemplate::new(409).set_body_string("subscription already exists"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .respond_with(created("ok"))
            .mount(&server)
            .await;

        let bootstrapper = EventSubBootstrapper::new(config(&server)).unwrap();
        let outcomes = bootstrapper.subscribe_all().await.unwrap();

        assert_eq!(outcomes.len(), 4);
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.topic.event_type())
            .collect();
        assert_eq!(failed, vec!["channel.subscribe"]);
        assert!(matches!(
            outcomes[1].result,
            Err(BootstrapError::SubscriptionRejected { status: 409, .. })
        ));
    }
}
