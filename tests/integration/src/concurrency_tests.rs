//! Concurrent coordinator calls
//!
//! Threads are released together through a barrier so the racing
//! operations overlap as closely as the scheduler allows.

use std::sync::{Arc, Barrier};
use std::thread;

use crate::test_utils::TestDispatch;
use lifelink_domain::{
    AvailabilityStatus, DispatchError, DriverId, PriorityStatus, RequestId, RequestStatus,
};
use rand::seq::SliceRandom;

fn race<T, F>(workers: usize, op: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(workers));
    let op = Arc::new(op);
    let handles: Vec<_> = (0..workers)
        .map(|n| {
            let barrier = barrier.clone();
            let op = op.clone();
            thread::spawn(move || {
                barrier.wait();
                op(n)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_assign_same_request() {
    for _ in 0..20 {
        let dispatch = TestDispatch::in_memory();
        let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Critical);
        let request = dispatch.submit(listing, "Dell Seton");
        let drivers = [dispatch.driver("Dana", "Reyes"), dispatch.driver("Eli", "Moss")];

        let coordinator = dispatch.coordinator.clone();
        let results = race(2, move |n| coordinator.assign_driver(request, drivers[n]));

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loser,
            Err(DispatchError::InvalidTransition {
                from: RequestStatus::Assigned,
                to: RequestStatus::Assigned,
            })
        ));

        let stored = dispatch.request(request);
        let winner = stored.driver_id.unwrap();
        assert!(drivers.contains(&winner));
        assert_eq!(
            drivers.iter().filter(|d| dispatch.eligible(**d)).count(),
            1
        );
        dispatch.assert_invariants();
    }
}

#[test]
fn test_concurrent_assign_same_driver() {
    for _ in 0..20 {
        let dispatch = TestDispatch::in_memory();
        let requests: Vec<RequestId> = (0..4)
            .map(|n| {
                let listing =
                    dispatch.publish(&format!("Hospital {n}"), "Liver", PriorityStatus::Urgent);
                dispatch.submit(listing, "Dell Seton")
            })
            .collect();
        let driver = dispatch.driver("Dana", "Reyes");

        let coordinator = dispatch.coordinator.clone();
        let targets = requests.clone();
        let results = race(4, move |n| coordinator.assign_driver(targets[n], driver));

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter(|r| r.is_err()) {
            assert_eq!(
                result,
                &Err(DispatchError::DriverUnavailable { driver_id: driver })
            );
        }

        let assigned = requests
            .iter()
            .filter(|id| dispatch.request(**id).status == RequestStatus::Assigned)
            .count();
        assert_eq!(assigned, 1);
        dispatch.assert_invariants();
    }
}

#[test]
fn test_concurrent_submissions_against_one_listing() {
    let dispatch = TestDispatch::in_memory();
    let listing = dispatch.publish("Mercy General", "Heart", PriorityStatus::Emergency);

    let submissions: Vec<_> = (0..8)
        .map(|n| dispatch.submission(listing, &format!("Hospital {n}")))
        .collect();

    let coordinator = dispatch.coordinator.clone();
    let results = race(8, move |n| coordinator.submit_request(submissions[n].clone()));

    let mut ids: Vec<RequestId> = results.into_iter().map(|r| r.unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(dispatch.availability(listing), AvailabilityStatus::Available);
}

#[test]
fn test_assign_races_cancel() {
    for _ in 0..20 {
        let dispatch = TestDispatch::in_memory();
        let listing = dispatch.publish("Mercy General", "Kidney", PriorityStatus::Normal);
        let request = dispatch.submit(listing, "Dell Seton");
        let driver = dispatch.driver("Dana", "Reyes");

        let coordinator = dispatch.coordinator.clone();
        let results = race(2, move |n| {
            if n == 0 {
                coordinator.assign_driver(request, driver)
            } else {
                coordinator.advance_status(request, RequestStatus::Cancelled)
            }
        });

        // Cancel always wins eventually: either before assignment or after
        assert!(results[1].is_ok());
        let stored = dispatch.request(request);
        assert_eq!(stored.status, RequestStatus::Cancelled);
        assert_eq!(stored.driver_id, None);
        assert!(dispatch.eligible(driver));
        assert_eq!(dispatch.availability(listing), AvailabilityStatus::Available);
        dispatch.assert_invariants();
    }
}

#[test]
fn test_random_operation_storm_keeps_invariants() {
    let dispatch = TestDispatch::in_memory();
    let drivers: Vec<DriverId> = (0..4)
        .map(|n| dispatch.driver(&format!("Driver{n}"), "Test"))
        .collect();
    let requests: Vec<RequestId> = (0..12)
        .map(|n| {
            let priority = [PriorityStatus::Normal, PriorityStatus::Critical][n % 2];
            let listing = dispatch.publish(&format!("Hospital {n}"), "Kidney", priority);
            dispatch.submit(listing, "Dell Seton")
        })
        .collect();

    let coordinator = dispatch.coordinator.clone();
    let (drivers_c, requests_c) = (drivers.clone(), requests.clone());
    race(6, move |_| {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let request = *requests_c.choose(&mut rng).unwrap();
            let driver = *drivers_c.choose(&mut rng).unwrap();
            let _ = match [0u8, 1, 2, 3, 4].choose(&mut rng).copied().unwrap_or(0) {
                0 => coordinator.assign_driver(request, driver),
                1 => coordinator.reassign_driver(request, driver),
                2 => coordinator.advance_status(request, RequestStatus::EnRoute),
                3 => coordinator.advance_status(request, RequestStatus::Delivered),
                _ => coordinator.advance_status(request, RequestStatus::Cancelled),
            };
        }
    });

    dispatch.assert_invariants();
    for id in requests {
        let request = dispatch.request(id);
        let statuses: Vec<RequestStatus> = request.history.iter().map(|t| t.to).collect();
        assert_eq!(statuses[0], RequestStatus::Requested);
        assert!(request.verify_history());
    }
}

#[test]
fn test_racing_transitions_emit_events_in_history_order() {
    for _ in 0..20 {
        let dispatch = TestDispatch::in_memory();
        let listing = dispatch.publish("Mercy General", "Heart", PriorityStatus::Emergency);
        let request = dispatch.submit(listing, "Dell Seton");
        let dana = dispatch.driver("Dana", "Reyes");
        dispatch.coordinator.assign_driver(request, dana).unwrap();
        let spares: Vec<DriverId> = ["Eli", "Fay", "Gus", "Hal"]
            .iter()
            .map(|first| dispatch.driver(first, "Moss"))
            .collect();

        let coordinator = dispatch.coordinator.clone();
        race(6, move |n| match spares.get(n) {
            Some(driver) => coordinator.reassign_driver(request, *driver),
            None => coordinator.advance_status(request, RequestStatus::EnRoute),
        });

        let stored = dispatch.request(request);
        let sequences: Vec<u64> = dispatch
            .events
            .events_for(request)
            .iter()
            .map(|e| e.sequence())
            .collect();
        let expected: Vec<u64> = (1..=stored.history.len() as u64).collect();
        assert_eq!(sequences, expected);
        dispatch.assert_invariants();
    }
}
