//! End-to-end request lifecycle scenarios

use crate::test_utils::TestDispatch;
use lifelink_dispatch::{rank_ledger, DispatchEvent, UnlinkedSubmission};
use lifelink_domain::{AvailabilityStatus, DispatchError, PriorityStatus, RequestStatus};

#[test]
fn test_emergency_outranks_earlier_critical() {
    let dispatch = TestDispatch::in_memory();
    let l1 = dispatch.publish("Mercy General", "Heart", PriorityStatus::Critical);
    let l2 = dispatch.publish("St. David's", "Liver", PriorityStatus::Emergency);

    let critical = dispatch.submit(l1, "Dell Seton");
    dispatch.clock.advance(60_000);
    let emergency = dispatch.submit(l2, "Dell Seton");

    let ranking = rank_ledger(dispatch.coordinator.requests().as_ref()).unwrap();
    assert_eq!(ranking.to_vec(), vec![emergency, critical]);
}

#[test]
fn test_full_delivery() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Urgent);
    let driver = dispatch.driver("Dana", "Reyes");
    let id = dispatch.submit(listing, "Dell Seton");

    dispatch.coordinator.assign_driver(id, driver).unwrap();
    dispatch.assert_invariants();
    dispatch.clock.advance(1_000);
    dispatch
        .coordinator
        .advance_status(id, RequestStatus::EnRoute)
        .unwrap();
    dispatch.assert_invariants();
    dispatch.clock.advance(1_000);
    dispatch
        .coordinator
        .advance_status(id, RequestStatus::Delivered)
        .unwrap();
    dispatch.assert_invariants();

    let request = dispatch.request(id);
    assert_eq!(request.status, RequestStatus::Delivered);
    assert_eq!(request.history.len(), 4);
    assert_eq!(dispatch.availability(listing), AvailabilityStatus::Unavailable);
    assert!(dispatch.eligible(driver));

    // Terminal: nothing moves any more
    for target in RequestStatus::ALL {
        assert!(matches!(
            dispatch.coordinator.advance_status(id, *target),
            Err(DispatchError::InvalidTransition { .. })
        ));
    }
    assert_eq!(dispatch.request(id), request);
}

#[test]
fn test_assign_twice_then_cancel() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
    let driver = dispatch.driver("Dana", "Reyes");
    let id = dispatch.submit(listing, "Dell Seton");

    dispatch.coordinator.assign_driver(id, driver).unwrap();
    assert!(matches!(
        dispatch.coordinator.assign_driver(id, driver),
        Err(DispatchError::InvalidTransition { .. })
    ));

    dispatch
        .coordinator
        .advance_status(id, RequestStatus::Cancelled)
        .unwrap();
    assert!(matches!(
        dispatch.coordinator.assign_driver(id, driver),
        Err(DispatchError::InvalidTransition {
            from: RequestStatus::Cancelled,
            ..
        })
    ));
    assert_eq!(dispatch.availability(listing), AvailabilityStatus::Available);
    assert!(dispatch.eligible(driver));
    dispatch.assert_invariants();
}

#[test]
fn test_cancelled_listing_can_be_requested_again() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
    let (dana, eli) = (dispatch.driver("Dana", "Reyes"), dispatch.driver("Eli", "Moss"));

    let first = dispatch.submit(listing, "Dell Seton");
    dispatch.coordinator.assign_driver(first, dana).unwrap();
    dispatch
        .coordinator
        .advance_status(first, RequestStatus::EnRoute)
        .unwrap();
    dispatch
        .coordinator
        .advance_status(first, RequestStatus::Cancelled)
        .unwrap();

    let second = dispatch.submit(listing, "St. Luke's");
    dispatch.coordinator.assign_driver(second, eli).unwrap();
    assert_eq!(dispatch.availability(listing), AvailabilityStatus::Reserved);
    dispatch.assert_invariants();
}

#[test]
fn test_reassign_before_pickup_only() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Lung", PriorityStatus::Critical);
    let (dana, eli) = (dispatch.driver("Dana", "Reyes"), dispatch.driver("Eli", "Moss"));
    let id = dispatch.submit(listing, "Dell Seton");

    dispatch.coordinator.assign_driver(id, dana).unwrap();
    dispatch.coordinator.reassign_driver(id, eli).unwrap();
    assert!(dispatch.eligible(dana));
    assert!(!dispatch.eligible(eli));
    dispatch.assert_invariants();

    dispatch
        .coordinator
        .advance_status(id, RequestStatus::EnRoute)
        .unwrap();
    assert_eq!(
        dispatch.coordinator.reassign_driver(id, dana),
        Err(DispatchError::InvalidTransition {
            from: RequestStatus::EnRoute,
            to: RequestStatus::Assigned,
        })
    );
    assert_eq!(dispatch.request(id).driver_id, Some(eli));
}

#[test]
fn test_updated_at_moves_only_on_change() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
    let driver = dispatch.driver("Dana", "Reyes");
    let id = dispatch.submit(listing, "Dell Seton");
    let created = dispatch.request(id).updated_at;

    // Rejected operations leave the stamp alone
    let _ = dispatch
        .coordinator
        .advance_status(id, RequestStatus::Delivered);
    assert_eq!(dispatch.request(id).updated_at, created);

    // Same clock reading still yields a strictly later stamp
    dispatch.coordinator.assign_driver(id, driver).unwrap();
    let assigned = dispatch.request(id).updated_at;
    assert!(assigned > created);

    dispatch.coordinator.reassign_driver(id, driver).unwrap();
    assert_eq!(dispatch.request(id).updated_at, assigned);
}

#[test]
fn test_unlinked_emergency_transport() {
    let dispatch = TestDispatch::in_memory();
    let driver = dispatch.driver("Dana", "Reyes");
    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Critical);
    let linked = dispatch.submit(listing, "Dell Seton");

    let unlinked = dispatch
        .coordinator
        .submit_unlinked_request(UnlinkedSubmission {
            hospital: "Dell Seton".into(),
            organ_type: "Heart".into(),
            origin: "Baylor Scott & White (Temple, TX)".into(),
            destination: "1500 Red River St, Austin, TX".into(),
            contact_phone: "555-0142".into(),
            notes: "Helipad pickup".into(),
            priority: None,
        })
        .unwrap();

    let ranking = rank_ledger(dispatch.coordinator.requests().as_ref()).unwrap();
    assert_eq!(ranking.first(), Some(unlinked));

    dispatch.coordinator.assign_driver(unlinked, driver).unwrap();
    dispatch
        .coordinator
        .advance_status(unlinked, RequestStatus::Cancelled)
        .unwrap();
    assert!(dispatch.eligible(driver));
    assert_eq!(dispatch.request(linked).status, RequestStatus::Requested);
    dispatch.assert_invariants();
}

#[test]
fn test_events_recorded_per_transition() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
    let (dana, eli) = (dispatch.driver("Dana", "Reyes"), dispatch.driver("Eli", "Moss"));
    let id = dispatch.submit(listing, "Dell Seton");

    dispatch.coordinator.assign_driver(id, dana).unwrap();
    dispatch.coordinator.reassign_driver(id, eli).unwrap();
    dispatch
        .coordinator
        .advance_status(id, RequestStatus::EnRoute)
        .unwrap();
    dispatch
        .coordinator
        .advance_status(id, RequestStatus::Delivered)
        .unwrap();

    let events = dispatch.events.events_for(id);
    assert_eq!(events.len(), 5);
    assert!(matches!(
        events[2],
        DispatchEvent::DriverReassigned { previous, driver_id, .. } if previous == dana && driver_id == eli
    ));
    let timestamps: Vec<u64> = events.iter().map(DispatchEvent::timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_hospital_views() {
    let dispatch = TestDispatch::in_memory();
    let mercy = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
    let seton = dispatch.publish("Dell Seton", "Cornea", PriorityStatus::Urgent);

    let outgoing = dispatch.submit(mercy, "Dell Seton");
    let incoming = dispatch.submit(seton, "Mercy General");

    let outbound = dispatch.views.outbound("Dell Seton").unwrap();
    assert_eq!(outbound.iter().map(|r| r.id).collect::<Vec<_>>(), vec![outgoing]);

    let inbound = dispatch.views.inbound("Dell Seton").unwrap();
    assert_eq!(inbound.iter().map(|r| r.id).collect::<Vec<_>>(), vec![incoming]);
}
