//! Ride-manager contact consolidation.
//!
//! The flat fields (`ride_manager`, `manager_email`, `manager_phone`) and
//! the structured `ride_manager_contact` map are kept in sync: either side
//! backfills the other, and the emitted contact always has name, email,
//! and phone slots (null for unknowns) with its name matching
//! `ride_manager`.

use ridecal_common::{CanonicalEvent, ContactInfo, RawRow};

pub fn consolidate(row: &RawRow, event: &mut CanonicalEvent) {
    let contact = row.get_object("ride_manager_contact");
    let field = |key: &str| -> Option<String> {
        contact
            .and_then(|c| c.get(key))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let contact_name = field("name");
    let contact_email = field("email");
    let contact_phone = field("phone");

    event.ride_manager = row
        .get_str("ride_manager")
        .map(str::to_string)
        .or(contact_name);
    event.manager_email = row
        .get_str("manager_email")
        .map(str::to_string)
        .or(contact_email.clone());
    event.manager_phone = row
        .get_str("manager_phone")
        .map(str::to_string)
        .or(contact_phone.clone());

    event.ride_manager_contact = ContactInfo {
        name: event.ride_manager.clone(),
        email: contact_email.or_else(|| event.manager_email.clone()),
        phone: contact_phone.or_else(|| event.manager_phone.clone()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ridecal_common::Source;
    use serde_json::json;

    fn blank_event() -> CanonicalEvent {
        CanonicalEvent::new(Source::Aerc, "X".into(), Utc::now(), "L".into())
    }

    fn row(fields: serde_json::Value) -> RawRow {
        RawRow::from_value(fields).unwrap()
    }

    #[test]
    fn flat_fields_populate_the_contact() {
        let mut event = blank_event();
        consolidate(
            &row(json!({ "ride_manager": "Jane Doe", "manager_email": "jane@example.com" })),
            &mut event,
        );
        assert_eq!(event.ride_manager.as_deref(), Some("Jane Doe"));
        assert_eq!(
            event.ride_manager_contact,
            ContactInfo {
                name: Some("Jane Doe".into()),
                email: Some("jane@example.com".into()),
                phone: None,
            }
        );
    }

    #[test]
    fn contact_name_backfills_ride_manager() {
        let mut event = blank_event();
        consolidate(
            &row(json!({ "ride_manager_contact": { "name": "John Roe", "phone": "555-1234" } })),
            &mut event,
        );
        assert_eq!(event.ride_manager.as_deref(), Some("John Roe"));
        assert_eq!(event.manager_phone.as_deref(), Some("555-1234"));
        assert_eq!(event.ride_manager_contact.name.as_deref(), Some("John Roe"));
    }

    #[test]
    fn contact_name_mirrors_ride_manager_when_both_present() {
        let mut event = blank_event();
        consolidate(
            &row(json!({
                "ride_manager": "Jane Doe",
                "ride_manager_contact": { "name": "Someone Else" }
            })),
            &mut event,
        );
        // The flat field wins; the contact mirrors it.
        assert_eq!(event.ride_manager, event.ride_manager_contact.name);
    }

    #[test]
    fn unknowns_stay_null() {
        let mut event = blank_event();
        consolidate(&row(json!({})), &mut event);
        assert_eq!(event.ride_manager_contact, ContactInfo::default());
    }
}
