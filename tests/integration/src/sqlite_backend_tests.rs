//! The SQLite backend under the coordinator

use std::sync::Arc;

use crate::test_utils::{new_driver, new_hospital, new_listing, TestDispatch};
use lifelink_core::{Clock, ManualClock};
use lifelink_dispatch::{
    rank_ledger, DriverRegistry, HospitalRegistry, ListingFilter, ListingStore, RequestLedger,
    SqliteStore,
};
use lifelink_domain::{
    AvailabilityStatus, DispatchError, PriorityStatus, RequestStatus, TransportRequest,
};

#[test]
fn test_lifecycle_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let dispatch = TestDispatch::sqlite(dir.path());

    let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Critical);
    let (dana, eli) = (dispatch.driver("Dana", "Reyes"), dispatch.driver("Eli", "Moss"));
    let id = dispatch.submit(listing, "Dell Seton");

    dispatch.coordinator.assign_driver(id, dana).unwrap();
    assert_eq!(dispatch.availability(listing), AvailabilityStatus::Reserved);

    dispatch.coordinator.reassign_driver(id, eli).unwrap();
    dispatch.clock.advance(30_000);
    dispatch
        .coordinator
        .advance_status(id, RequestStatus::EnRoute)
        .unwrap();
    dispatch.clock.advance(30_000);
    dispatch
        .coordinator
        .advance_status(id, RequestStatus::Delivered)
        .unwrap();

    let request = dispatch.request(id);
    assert_eq!(request.status, RequestStatus::Delivered);
    assert_eq!(request.driver_id, Some(eli));
    assert_eq!(request.updated_at, dispatch.now());
    assert_eq!(request.history.len(), 5);
    assert_eq!(dispatch.availability(listing), AvailabilityStatus::Unavailable);
    assert!(dispatch.eligible(dana));
    assert!(dispatch.eligible(eli));
    dispatch.assert_invariants();

    let board = dispatch.views.driver_board(eli).unwrap();
    assert_eq!(board.completed.len(), 1);
    assert!(board.current.is_none());
}

#[test]
fn test_sqlite_rejections_leave_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let dispatch = TestDispatch::sqlite(dir.path());

    let first = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
    let second = dispatch.publish("Mercy General", "Liver", PriorityStatus::Normal);
    let driver = dispatch.driver("Dana", "Reyes");
    let r1 = dispatch.submit(first, "Dell Seton");
    let r2 = dispatch.submit(second, "Dell Seton");

    dispatch.coordinator.assign_driver(r1, driver).unwrap();
    let before = dispatch.request(r2);
    assert_eq!(
        dispatch.coordinator.assign_driver(r2, driver),
        Err(DispatchError::DriverUnavailable { driver_id: driver })
    );
    assert_eq!(dispatch.request(r2), before);
    assert_eq!(dispatch.availability(second), AvailabilityStatus::Available);

    let mut bad = dispatch.submission(first, "Dell Seton");
    bad.priority = Some("Eventually".into());
    assert!(matches!(
        dispatch.coordinator.submit_request(bad),
        Err(DispatchError::InvalidListing { .. })
    ));

    let mut bad = dispatch.submission(second, "Dell Seton");
    bad.priority = Some("Eventually".into());
    assert_eq!(
        dispatch.coordinator.submit_request(bad),
        Err(DispatchError::InvalidPriority("Eventually".into()))
    );
    assert_eq!(dispatch.coordinator.requests().list().unwrap().len(), 2);
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifelink.db");
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(5_000));

    let (listing, driver, request) = {
        let store = SqliteStore::open(&path, clock.clone()).unwrap();
        let mercy = HospitalRegistry::register(&store, new_hospital("Mercy General")).unwrap();
        let listing = store
            .publish(new_listing(mercy, "Mercy General", "Heart", PriorityStatus::Emergency))
            .unwrap();
        let driver = DriverRegistry::register(&store, new_driver("Dana", "Reyes")).unwrap();
        let request = store
            .create(lifelink_domain::NewTransportRequest {
                listing_id: Some(listing),
                hospital: "Dell Seton".into(),
                organ_type: "Heart".into(),
                origin: "Mercy General (Austin, TX)".into(),
                destination: "1500 Red River St".into(),
                contact_phone: "555-0142".into(),
                notes: String::new(),
                priority: PriorityStatus::Emergency,
            })
            .unwrap();
        store.claim(driver, request).unwrap();
        (listing, driver, request)
    };

    let store = SqliteStore::open(&path, clock).unwrap();
    assert!(store.find_by_name("mercy general").unwrap().is_some());
    assert_eq!(
        ListingStore::get(&store, listing).unwrap().priority,
        PriorityStatus::Emergency
    );
    assert!(!store.is_eligible(driver).unwrap());
    let stored = RequestLedger::get(&store, request).unwrap();
    assert!(stored.verify_history());

    let ranking = rank_ledger(&store).unwrap();
    assert_eq!(ranking.to_vec(), vec![request]);

    let found = ListingStore::list(
        &store,
        &ListingFilter {
            query: Some("heart".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(found.len(), 1);
}

#[test]
fn test_backends_agree_on_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let memory = TestDispatch::in_memory();
    let sqlite = TestDispatch::sqlite(dir.path());

    let plan = [
        PriorityStatus::Normal,
        PriorityStatus::Emergency,
        PriorityStatus::Urgent,
        PriorityStatus::Critical,
        PriorityStatus::Emergency,
        PriorityStatus::Normal,
    ];
    for dispatch in [&memory, &sqlite] {
        for (n, priority) in plan.iter().enumerate() {
            let listing = dispatch.publish(&format!("Hospital {n}"), "Kidney", *priority);
            dispatch.submit(listing, "Dell Seton");
            dispatch.clock.advance(1_000);
        }
    }

    let ranked = |dispatch: &TestDispatch| {
        rank_ledger(dispatch.coordinator.requests().as_ref())
            .unwrap()
            .iter()
            .map(|id| id.get())
            .collect::<Vec<_>>()
    };
    assert_eq!(ranked(&memory), ranked(&sqlite));
    assert_eq!(ranked(&memory), vec![2, 5, 4, 3, 1, 6]);
}

#[test]
fn test_backends_agree_after_update() {
    let dir = tempfile::tempdir().unwrap();
    let memory = TestDispatch::in_memory();
    let sqlite = TestDispatch::sqlite(dir.path());

    let stored: Vec<TransportRequest> = [&memory, &sqlite]
        .into_iter()
        .map(|dispatch| {
            let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Urgent);
            let id = dispatch.submit(listing, "Dell Seton");
            dispatch.clock.advance(1_000);
            dispatch
                .coordinator
                .requests()
                .update(id, &mut |r, _| {
                    r.notes = "Cooler swapped at relay point".into();
                    r.contact_phone = "555-0199".into();
                    r.priority = PriorityStatus::Emergency;
                    Ok(())
                })
                .unwrap();
            dispatch.request(id)
        })
        .collect();

    assert_eq!(stored[0], stored[1]);
    assert_eq!(stored[1].notes, "Cooler swapped at relay point");
    assert_eq!(stored[1].contact_phone, "555-0199");
    assert_eq!(stored[1].priority, PriorityStatus::Emergency);
}

#[test]
fn test_hospital_registry_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let dispatch = TestDispatch::sqlite(dir.path());

    let listing = dispatch.publish("Mercy General", "Liver", PriorityStatus::Critical);
    let stored = dispatch.coordinator.listings().get(listing).unwrap();
    assert_eq!(stored.hospital_id, dispatch.hospital("MERCY GENERAL"));
    assert_eq!(stored.origin_label(), "Mercy General (Austin, TX)");

    let mut unknown = dispatch.submission(listing, "Dell Seton");
    unknown.hospital_id = lifelink_domain::HospitalId(404);
    assert!(matches!(
        dispatch.coordinator.submit_request(unknown),
        Err(DispatchError::InvalidRequest(_))
    ));
    assert!(dispatch.coordinator.requests().list().unwrap().is_empty());
}
