//! Tests for the core alert types.

use super::*;

mod alert_kind_tests {
    use super::*;

    /// Every kind maps to its EventSub type and back.
    #[test]
    fn test_event_type_mapping_is_bijective() {
        for kind in AlertKind::ALL {
            assert_eq!(AlertKind::from_event_type(kind.event_type()), Some(kind));
        }
    }

    /// Only the four announced types are recognized.
    #[test]
    fn test_unknown_event_type_is_none() {
        assert_eq!(AlertKind::from_event_type("channel.raid"), None);
        assert_eq!(AlertKind::from_event_type(""), None);
        assert!("stream.online".parse::<AlertKind>().is_err());
    }

    /// Automation identifiers match the values the automation host expects.
    #[test]
    fn test_automation_types() {
        assert_eq!(AlertKind::Follow.automation_type(), "follow");
        assert_eq!(AlertKind::Subscribe.automation_type(), "sub");
        assert_eq!(AlertKind::GiftSub.automation_type(), "gift");
        assert_eq!(AlertKind::Cheer.automation_type(), "bits");
    }
}

mod alert_event_tests {
    use super::*;

    /// A cheer keeps its bit count.
    #[test]
    fn test_cheer_with_magnitude() {
        let event = AlertEvent::new(AlertKind::Cheer, "Ada", Some(250)).unwrap();
        assert_eq!(event.kind(), AlertKind::Cheer);
        assert_eq!(event.subject(), "Ada");
        assert_eq!(event.magnitude(), Some(250));
    }

    /// Zero bits is a valid (if stingy) cheer.
    #[test]
    fn test_cheer_with_zero_bits() {
        let event = AlertEvent::new(AlertKind::Cheer, "Ada", Some(0)).unwrap();
        assert_eq!(event.magnitude(), Some(0));
    }

    /// An empty subject is rejected.
    #[test]
    fn test_empty_subject_rejected() {
        let result = AlertEvent::new(AlertKind::Follow, "   ", None);
        assert!(matches!(result, Err(ValidationError::Required { .. })));
    }

    /// Cheers without bits are rejected.
    #[test]
    fn test_cheer_without_magnitude_rejected() {
        let result = AlertEvent::new(AlertKind::Cheer, "Ada", None);
        assert!(matches!(result, Err(ValidationError::InvalidFormat { .. })));
    }

    /// Non-cheer kinds never carry a magnitude.
    #[test]
    fn test_follow_with_magnitude_rejected() {
        let result = AlertEvent::new(AlertKind::Follow, "Bob", Some(1));
        assert!(matches!(result, Err(ValidationError::InvalidFormat { .. })));
    }

    /// Deserialized events pass the same checks as constructed ones.
    #[test]
    fn test_deserialize_validates() {
        let event: AlertEvent =
            serde_json::from_str(r#"{"kind":"cheer","subject":"Ada","magnitude":250}"#).unwrap();
        assert_eq!(event, AlertEvent::new(AlertKind::Cheer, "Ada", Some(250)).unwrap());

        let missing_bits = serde_json::from_str::<AlertEvent>(r#"{"kind":"cheer","subject":"Ada"}"#);
        assert!(missing_bits.is_err());

        let blank = serde_json::from_str::<AlertEvent>(r#"{"kind":"follow","subject":"  "}"#);
        assert!(blank.is_err());
    }
}
