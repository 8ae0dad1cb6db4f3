//! Property-based tests for the lot state machine
//!
//! The lot contract is where custody is decided, so these tests drive it with
//! generated operation sequences and compare every outcome against a small
//! reference model of the transition table. A second group checks that
//! fractionation conserves units and that rejected calls leave the ledger
//! untouched.

use std::sync::Arc;

use proptest::prelude::*;
use traceability_ledger::{
    ErrorKind, SupplyChain,
    identity::{Authority, CallContext},
    lot::{Lot, LotController, LotOperation, LotState, NewLot, ProductCondition},
    types::{Capacity, Location, Price, Relocation},
    warehouse::{WarehouseController, WarehouseOperation},
};

// These property tests cover:
//
// 1. State preconditions - each transition, splits included, succeeds exactly
//    when the table allows it
// 2. Atomic refusal - a refused transition leaves the record unchanged
// 3. Fractionation conservation - children carry the split units and the lineage
// 4. Unbalanced splits - rejected with a validation error, parent untouched
// 5. Advisor gating - a caller that does not advise the lot cannot change it

#[derive(Debug, Clone, Copy)]
enum Step {
    Transport,
    Store,
    Transfer,
    Transshipment,
    Sell,
    Return,
    PutOnReparation,
    Repair,
    PutOnUsing,
    Fractionate,
    Destroy,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Transport),
        Just(Step::Store),
        Just(Step::Transfer),
        Just(Step::Transshipment),
        Just(Step::Sell),
        Just(Step::Return),
        Just(Step::PutOnReparation),
        Just(Step::Repair),
        Just(Step::PutOnUsing),
        Just(Step::Fractionate),
        Just(Step::Destroy),
    ]
}

/// Expected state and condition after `step`, or `None` if it must be refused.
fn model(
    step: Step,
    state: LotState,
    condition: ProductCondition,
) -> Option<(LotState, ProductCondition)> {
    use LotState::*;
    use ProductCondition::*;

    match (step, state) {
        (Step::Transport, Selled | Destroyed) => None,
        (Step::Transport, _) => Some((Transporting, condition)),
        (Step::Store, Transporting) => Some((Stored, condition)),
        (Step::Transfer, Transporting) => Some((Stored, condition)),
        (Step::Transshipment, Transporting) => Some((Transporting, condition)),
        (Step::Sell, Stored) => Some((Selled, condition)),
        (Step::Return, Selled) => Some((Stored, Broken)),
        (Step::Return, Stored) => Some((Transporting, Broken)),
        (Step::PutOnReparation, Transporting) if condition == Broken => Some((Repairing, Broken)),
        (Step::Repair, Repairing) => Some((Transporting, Normal)),
        (Step::PutOnUsing, Transporting | Manufacturing) if condition == Normal => {
            Some((Using, condition))
        }
        (Step::Fractionate, Stored | Using | Manufacturing) => Some((Destroyed, condition)),
        (Step::Destroy, Destroyed) => None,
        (Step::Destroy, _) => Some((Destroyed, condition)),
        _ => None,
    }
}

fn setup(units: &str) -> (SupplyChain, CallContext) {
    let db = sled::Config::new()
        .temporary(true)
        .open()
        .expect("temporary sled db");
    let service = SupplyChain::new(Arc::new(db), Authority::permissive("Org1MSP"));
    let alice = CallContext::new("alice", "Org1MSP");

    service
        .invoke(&alice, WarehouseOperation::Create, |tx| {
            WarehouseController::create(tx, "W1", Capacity::default(), Location::default())
        })
        .expect("warehouse");
    service
        .invoke(&alice, LotOperation::Create, |tx| {
            LotController::create(
                tx,
                NewLot {
                    key: "L1".to_string(),
                    units: units.to_string(),
                    current_location_id: "W1".to_string(),
                    ..NewLot::default()
                },
            )
        })
        .expect("lot");
    (service, alice)
}

fn apply(service: &SupplyChain, caller: &CallContext, step: Step) -> traceability_ledger::Result<Lot> {
    let to = Relocation {
        location_id: "W1".to_string(),
        new_advisor: "alice".to_string(),
        ..Relocation::default()
    };
    match step {
        Step::Transport => service.invoke(caller, LotOperation::Transport, |tx| {
            LotController::transport(tx, "L1", &to)
        }),
        Step::Store => service.invoke(caller, LotOperation::Store, |tx| {
            LotController::store(tx, "L1", &to)
        }),
        Step::Transfer => service.invoke(caller, LotOperation::Transfer, |tx| {
            LotController::transfer(tx, "L1", &to, "Org1MSP", Price::default())
        }),
        Step::Transshipment => service.invoke(caller, LotOperation::Transshipment, |tx| {
            LotController::transshipment(tx, "L1", &to)
        }),
        Step::Sell => service.invoke(caller, LotOperation::Sell, |tx| {
            LotController::sell(tx, "L1", Price::default())
        }),
        Step::Return => service.invoke(caller, LotOperation::Return, |tx| {
            LotController::return_lot(tx, "L1", &to, "Org1MSP")
        }),
        Step::PutOnReparation => service.invoke(caller, LotOperation::PutOnReparation, |tx| {
            LotController::put_on_reparation(tx, "L1", &to, "Org1MSP")
        }),
        Step::Repair => service.invoke(caller, LotOperation::Repair, |tx| {
            LotController::repair(tx, "L1", &to)
        }),
        Step::PutOnUsing => service.invoke(caller, LotOperation::PutOnUsing, |tx| {
            LotController::put_on_using(tx, "L1", &to)
        }),
        Step::Fractionate => service.invoke(caller, LotOperation::Fractionate, |tx| {
            LotController::fractionate(tx, "L1", "4", "6", "L1-A", "L1-B")?;
            LotController::get(tx, "L1")
        }),
        Step::Destroy => service.invoke(caller, LotOperation::Destroy, |tx| {
            LotController::destroy(tx, "L1")
        }),
    }
}

fn current(service: &SupplyChain, caller: &CallContext) -> Lot {
    service
        .invoke(caller, LotOperation::Get, |tx| LotController::get(tx, "L1"))
        .expect("lot is readable")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every transition succeeds exactly when the table allows it
    /// and lands in the documented state; refused ones change nothing.
    #[test]
    fn prop_state_preconditions_are_exact(
        steps in prop::collection::vec(step_strategy(), 1..=12)
    ) {
        let (service, alice) = setup("10");

        for step in steps {
            let before = current(&service, &alice);
            let expected = model(step, before.state, before.product_state);

            match (apply(&service, &alice, step), expected) {
                (Ok(lot), Some((state, condition))) => {
                    prop_assert_eq!(lot.state, state, "{:?} from {:?}", step, before.state);
                    prop_assert_eq!(lot.product_state, condition);
                    prop_assert_eq!(current(&service, &alice), lot);
                }
                (Err(err), None) => {
                    prop_assert_eq!(err.kind(), ErrorKind::InvalidState, "{:?} from {:?}", step, before.state);
                    prop_assert_eq!(current(&service, &alice), before);
                }
                (outcome, expected) => {
                    prop_assert!(
                        false,
                        "{:?} from {:?}: got {:?}, expected {:?}",
                        step, before.state, outcome.map(|lot| lot.state), expected
                    );
                }
            }
        }
    }

    /// Property: a balanced split creates two children holding exactly the
    /// split units, both pointing back at the parent, and destroys the parent.
    #[test]
    fn prop_fractionation_conserves_units(
        total in 2u64..10_000,
        cut in any::<u64>(),
    ) {
        let first = 1 + cut % (total - 1);
        let second = total - first;
        let (service, alice) = setup(&total.to_string());

        let (a, b) = service
            .invoke(&alice, LotOperation::Fractionate, |tx| {
                LotController::fractionate(tx, "L1", &first.to_string(), &second.to_string(), "A", "B")
            })
            .expect("balanced split");

        prop_assert_eq!(a.units.parse::<u64>().unwrap(), first);
        prop_assert_eq!(b.units.parse::<u64>().unwrap(), second);
        prop_assert_eq!(&a.father_id, "L1");
        prop_assert_eq!(&b.father_id, "L1");
        prop_assert_eq!(current(&service, &alice).state, LotState::Destroyed);

        let mut lots = service
            .invoke(&alice, LotOperation::List, |tx| LotController::list(tx))
            .expect("list");
        lots.sort();
        prop_assert_eq!(lots, vec!["A".to_string(), "B".to_string()]);
    }

    /// Property: a split whose parts do not add up is refused and the parent
    /// stays exactly as it was.
    #[test]
    fn prop_unbalanced_split_is_rejected(
        total in 1u64..10_000,
        first in 1u64..10_000,
        second in 1u64..10_000,
    ) {
        prop_assume!(first + second != total);
        let (service, alice) = setup(&total.to_string());
        let before = current(&service, &alice);

        let err = service
            .invoke(&alice, LotOperation::Fractionate, |tx| {
                LotController::fractionate(tx, "L1", &first.to_string(), &second.to_string(), "A", "B")
            })
            .unwrap_err();

        prop_assert_eq!(err.kind(), ErrorKind::Validation);
        prop_assert_eq!(current(&service, &alice), before);
        let exists = service
            .invoke(&alice, LotOperation::Exists, |tx| LotController::exists(tx, "A"))
            .expect("exists");
        prop_assert!(!exists);
    }

    /// Property: whatever the lot's state, a caller other than its advisor is
    /// refused with an authorization error.
    #[test]
    fn prop_only_the_advisor_mutates(
        setup_steps in prop::collection::vec(step_strategy(), 0..=6),
        step in step_strategy(),
        name in "[a-z]{3,8}",
    ) {
        prop_assume!(name != "alice");
        let (service, alice) = setup("10");
        for setup_step in setup_steps {
            let _ = apply(&service, &alice, setup_step);
        }
        let before = current(&service, &alice);

        let stranger = CallContext::new(&name, "Org1MSP");
        let err = apply(&service, &stranger, step).unwrap_err();

        prop_assert_eq!(err.kind(), ErrorKind::Authorization);
        prop_assert_eq!(current(&service, &alice), before);
    }
}
