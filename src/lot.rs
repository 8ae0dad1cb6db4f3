//! Lots: traceable batches of goods and their custody state machine.
use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::context::TxContext;
use crate::error::{LedgerError, Result};
use crate::history::HistoryRecord;
use crate::operation::{Contract, operations};
use crate::record::Record;
use crate::types::{Certification, Environment, Price, Relocation, parse_units};

pub const LOT_INDEX: &str = "lot";
const ENTITY: &str = "lot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum LotState {
    #[n(0)]
    Manufacturing,
    #[n(1)]
    Transporting,
    #[n(2)]
    Stored,
    #[n(3)]
    Repairing,
    #[n(4)]
    Selled,
    #[n(5)]
    Destroyed,
    #[n(6)]
    Using,
}

impl LotState {
    pub fn name(self) -> &'static str {
        match self {
            LotState::Manufacturing => "Manufacturing",
            LotState::Transporting => "Transporting",
            LotState::Stored => "Stored",
            LotState::Repairing => "Repairing",
            LotState::Selled => "Selled",
            LotState::Destroyed => "Destroyed",
            LotState::Using => "Using",
        }
    }

    /// Sold and destroyed lots no longer accept custody changes.
    pub fn is_closed(self) -> bool {
        match self {
            LotState::Selled | LotState::Destroyed => true,
            LotState::Manufacturing
            | LotState::Transporting
            | LotState::Stored
            | LotState::Repairing
            | LotState::Using => false,
        }
    }

    pub fn can_fractionate(self) -> bool {
        match self {
            LotState::Stored | LotState::Using | LotState::Manufacturing => true,
            LotState::Transporting
            | LotState::Repairing
            | LotState::Selled
            | LotState::Destroyed => false,
        }
    }
}

impl fmt::Display for LotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical condition of the goods in a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum ProductCondition {
    #[n(0)]
    Normal,
    #[n(1)]
    Broken,
}

impl fmt::Display for ProductCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProductCondition::Normal => "Normal",
            ProductCondition::Broken => "Broken",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Lot {
    #[n(0)]
    pub doc_type: String,
    #[n(1)]
    pub lot_id: String,
    #[n(2)]
    pub product_id: String,
    #[n(3)]
    pub manufacture_id: String,
    #[n(4)]
    pub owner_id: String,
    #[n(5)]
    pub advisor: String,
    #[n(6)]
    pub price: Price,
    #[n(7)]
    pub units: String,
    #[n(8)]
    pub certifications: Vec<Certification>,
    #[n(9)]
    pub environment: Environment,
    #[n(10)]
    pub state: LotState,
    #[n(11)]
    pub components: Vec<String>,
    #[n(12)]
    pub current_location_id: String,
    /// Lot this one was fractionated from, empty for a root lot.
    #[n(13)]
    pub father_id: String,
    #[n(14)]
    pub product_state: ProductCondition,
}

impl Record for Lot {
    const DOC_TYPE: &'static str = "lot";

    fn doc_type(&self) -> &str {
        &self.doc_type
    }
}

impl Lot {
    fn index_attributes(&self) -> [&str; 3] {
        [
            self.lot_id.as_str(),
            self.product_id.as_str(),
            self.manufacture_id.as_str(),
        ]
    }

    fn relocate(&mut self, to: &Relocation) {
        self.current_location_id = to.location_id.clone();
        self.advisor = to.new_advisor.clone();
        self.environment = to.environment.clone();
    }
}

/// Arguments of [`LotController::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLot {
    pub key: String,
    pub product_id: String,
    pub manufacture_id: String,
    pub price: Price,
    pub units: String,
    pub environment: Environment,
    pub components: Vec<String>,
    pub current_location_id: String,
}

/// Genealogy of a lot over its declared components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceabilityResult {
    pub traced_lot_id: String,
    pub history: Vec<HistoryRecord<Lot>>,
    pub child_traceabilities: Vec<TraceabilityResult>,
}

operations! {
    pub enum LotOperation for "lot" {
        Create => "CreateLot": Submit,
        Exists => "ExistsLot": Evaluate,
        Inspection => "LotInspection": Submit,
        Store => "StoreLot": Submit,
        Transport => "TransportLot": Submit,
        Fractionate => "FractionateLot": Submit,
        Transfer => "TransferLot": Submit,
        Transshipment => "TransshipmentLot": Submit,
        Return => "ReturnLot": Submit,
        PutOnReparation => "PutLotOnReparation": Submit,
        Repair => "RepairLot": Submit,
        PutOnUsing => "PutLotOnUsing": Submit,
        UpdatePrice => "UpdatePrice": Submit,
        UpdateAdvisor => "UpdateAdvisor": Submit,
        UpdateEnvironment => "UpdateEnvironment": Submit,
        Sell => "SellLot": Submit,
        Destroy => "LotDestroyed": Submit,
        Get => "GetLot": Evaluate,
        GetUnits => "GetLotUnits": Evaluate,
        GetAdvisor => "GetLotAdvisor": Evaluate,
        GetHistory => "GetLotHistory": Evaluate,
        GetTraceability => "GetLotTraceability": Evaluate,
        IsUsing => "IsLotUsing": Evaluate,
        IsReparing => "IsLotReparing": Evaluate,
        IsStored => "IsLotStored": Evaluate,
        IsManufacturing => "IsLotManufacturing": Evaluate,
        IsSelled => "IsLotSelled": Evaluate,
        List => "ListLots": Evaluate,
    }
}

pub struct LotController;

impl Contract for LotController {
    type Operation = LotOperation;
}

fn expect_state(lot: &Lot, expected: LotState) -> Result<()> {
    if lot.state != expected {
        return Err(LedgerError::invalid_state(
            ENTITY,
            &lot.lot_id,
            expected.name(),
            lot.state,
        ));
    }
    Ok(())
}

fn expect_open(lot: &Lot) -> Result<()> {
    if lot.state.is_closed() {
        return Err(LedgerError::invalid_state(
            ENTITY,
            &lot.lot_id,
            "neither Selled nor Destroyed",
            lot.state,
        ));
    }
    Ok(())
}

impl LotController {
    /// Loads `key` and checks the caller advises it.
    fn load_advised(tx: &TxContext<'_>, key: &str) -> Result<Lot> {
        let lot: Lot = tx.load(key)?;
        tx.require_advisor(ENTITY, key, &lot.advisor)?;
        Ok(lot)
    }

    fn save_transition(tx: &mut TxContext<'_>, lot: &Lot, from: LotState) -> Result<()> {
        if from != lot.state {
            debug!(lot = %lot.lot_id, from = %from, to = %lot.state, "lot state changed");
        }
        tx.store(&lot.lot_id, lot)
    }

    /// Runs every check [`Self::create`] makes, without writing.
    pub fn check_new(tx: &TxContext<'_>, new: &NewLot) -> Result<()> {
        tx.require_role("abac.manufacturer")?;
        tx.require_absent(ENTITY, &new.key)?;
        tx.require_location(&new.current_location_id)?;

        if parse_units("units", &new.units)? < 1 {
            return Err(LedgerError::Validation(format!(
                "cannot create lot {} with less than 1 unit",
                new.key
            )));
        }
        if new.components.iter().any(|c| c == &new.key) {
            return Err(LedgerError::Validation(format!(
                "lot {} cannot be its own component",
                new.key
            )));
        }
        tx.require_same_org()?;
        Ok(())
    }

    pub fn create(tx: &mut TxContext<'_>, new: NewLot) -> Result<Lot> {
        Self::check_new(tx, &new)?;

        let advisor = tx.principal()?;
        let owner_id = tx.require_same_org()?;

        let lot = Lot {
            doc_type: Lot::DOC_TYPE.to_string(),
            lot_id: new.key,
            product_id: new.product_id,
            manufacture_id: new.manufacture_id,
            owner_id,
            advisor,
            price: new.price,
            units: new.units,
            certifications: Vec::new(),
            environment: new.environment,
            state: LotState::Manufacturing,
            components: new.components,
            current_location_id: new.current_location_id,
            father_id: String::new(),
            product_state: ProductCondition::Normal,
        };

        tx.store(&lot.lot_id, &lot)?;
        tx.put_index(LOT_INDEX, &lot.index_attributes())?;
        debug!(lot = %lot.lot_id, units = %lot.units, "lot created");
        Ok(lot)
    }

    pub fn exists(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        tx.exists(key)
    }

    pub fn inspection(tx: &mut TxContext<'_>, key: &str, certification: Certification) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        expect_open(&lot)?;

        lot.certifications.push(certification);
        tx.store(key, &lot)?;
        Ok(lot)
    }

    pub fn store(tx: &mut TxContext<'_>, key: &str, to: &Relocation) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        expect_state(&lot, LotState::Transporting)?;
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = LotState::Stored;
        lot.relocate(to);
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    pub fn transport(tx: &mut TxContext<'_>, key: &str, to: &Relocation) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        expect_open(&lot)?;
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = LotState::Transporting;
        lot.relocate(to);
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    /// Splits `key` into two new lots holding `units_1` and `units_2` units
    /// and destroys `key`.
    pub fn fractionate(
        tx: &mut TxContext<'_>,
        key: &str,
        units_1: &str,
        units_2: &str,
        child_1: &str,
        child_2: &str,
    ) -> Result<(Lot, Lot)> {
        let parent = Self::load_advised(tx, key)?;
        if !parent.state.can_fractionate() {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "Stored, Using or Manufacturing",
                parent.state,
            ));
        }

        let total = parse_units("units", &parent.units)?;
        let first = parse_units("units of the first lot", units_1)?;
        let second = parse_units("units of the second lot", units_2)?;
        if first == 0 || second == 0 {
            return Err(LedgerError::Validation(
                "fractionated lots need at least 1 unit each".to_string(),
            ));
        }
        if first.checked_add(second) != Some(total) {
            return Err(LedgerError::Validation(format!(
                "lot {key} holds {total} units, cannot split into {first} and {second}"
            )));
        }
        if child_1 == child_2 || child_1 == key || child_2 == key {
            return Err(LedgerError::Validation(format!(
                "fractionated lots of {key} need two new distinct ids"
            )));
        }
        tx.require_absent(ENTITY, child_1)?;
        tx.require_absent(ENTITY, child_2)?;

        let advisor = tx.principal()?;
        let mut children = Vec::with_capacity(2);
        for (child_id, units) in [(child_1, units_1), (child_2, units_2)] {
            let child = Lot {
                lot_id: child_id.to_string(),
                units: units.trim().to_string(),
                advisor: advisor.clone(),
                father_id: key.to_string(),
                ..parent.clone()
            };
            tx.store(child_id, &child)?;
            tx.put_index(LOT_INDEX, &child.index_attributes())?;
            children.push(child);
        }

        Self::destroy(tx, key)?;
        debug!(lot = key, first = child_1, second = child_2, "lot fractionated");

        let second_child = children.pop();
        let first_child = children.pop();
        match (first_child, second_child) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(LedgerError::Storage(format!(
                "fractionation of {key} produced no lots"
            ))),
        }
    }

    pub fn transfer(
        tx: &mut TxContext<'_>,
        key: &str,
        to: &Relocation,
        new_owner: &str,
        price: Price,
    ) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        tx.require_same_org()?;
        expect_state(&lot, LotState::Transporting)?;
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = LotState::Stored;
        lot.relocate(to);
        lot.owner_id = new_owner.to_string();
        lot.price = price;
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    /// Hands a transporting lot to another carrier without changing its state.
    pub fn transshipment(tx: &mut TxContext<'_>, key: &str, to: &Relocation) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        expect_state(&lot, LotState::Transporting)?;
        tx.require_location(&to.location_id)?;

        lot.relocate(to);
        tx.store(key, &lot)?;
        Ok(lot)
    }

    /// Sold lots come back into storage, stored lots go back on the road.
    /// Either way the goods are marked broken.
    pub fn return_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        to: &Relocation,
        new_owner: &str,
    ) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        tx.require_same_org()?;
        let next = match lot.state {
            LotState::Selled => LotState::Stored,
            LotState::Stored => LotState::Transporting,
            LotState::Manufacturing
            | LotState::Transporting
            | LotState::Repairing
            | LotState::Destroyed
            | LotState::Using => {
                return Err(LedgerError::invalid_state(
                    ENTITY,
                    key,
                    "Selled or Stored",
                    lot.state,
                ));
            }
        };
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = next;
        lot.product_state = ProductCondition::Broken;
        lot.relocate(to);
        lot.owner_id = new_owner.to_string();
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    pub fn put_on_reparation(
        tx: &mut TxContext<'_>,
        key: &str,
        to: &Relocation,
        new_owner: &str,
    ) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        tx.require_same_org()?;
        expect_state(&lot, LotState::Transporting)?;
        if lot.product_state != ProductCondition::Broken {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "Broken goods",
                format!("{} goods", lot.product_state),
            ));
        }
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = LotState::Repairing;
        lot.relocate(to);
        lot.owner_id = new_owner.to_string();
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    pub fn repair(tx: &mut TxContext<'_>, key: &str, to: &Relocation) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        expect_state(&lot, LotState::Repairing)?;
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = LotState::Transporting;
        lot.product_state = ProductCondition::Normal;
        lot.relocate(to);
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    pub fn put_on_using(tx: &mut TxContext<'_>, key: &str, to: &Relocation) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        match lot.state {
            LotState::Transporting | LotState::Manufacturing => {}
            LotState::Stored
            | LotState::Repairing
            | LotState::Selled
            | LotState::Destroyed
            | LotState::Using => {
                return Err(LedgerError::invalid_state(
                    ENTITY,
                    key,
                    "Transporting or Manufacturing",
                    lot.state,
                ));
            }
        }
        if lot.product_state == ProductCondition::Broken {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "Normal goods",
                "Broken goods",
            ));
        }
        tx.require_location(&to.location_id)?;

        let from = lot.state;
        lot.state = LotState::Using;
        lot.relocate(to);
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    pub fn update_price(tx: &mut TxContext<'_>, key: &str, price: Price) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        lot.price = price;
        tx.store(key, &lot)?;
        Ok(lot)
    }

    pub fn update_advisor(tx: &mut TxContext<'_>, key: &str, new_advisor: &str) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        if new_advisor.is_empty() {
            return Err(LedgerError::Validation("new advisor must not be empty".to_string()));
        }
        lot.advisor = new_advisor.to_string();
        tx.store(key, &lot)?;
        Ok(lot)
    }

    pub fn update_environment(
        tx: &mut TxContext<'_>,
        key: &str,
        environment: Environment,
    ) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        lot.environment = environment;
        tx.store(key, &lot)?;
        Ok(lot)
    }

    pub fn sell(tx: &mut TxContext<'_>, key: &str, price: Price) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        expect_state(&lot, LotState::Stored)?;

        let from = lot.state;
        lot.state = LotState::Selled;
        lot.price = price;
        Self::save_transition(tx, &lot, from)?;
        Ok(lot)
    }

    /// Marks the lot destroyed and drops its index entry. The record and its
    /// history stay on the ledger.
    pub fn destroy(tx: &mut TxContext<'_>, key: &str) -> Result<Lot> {
        let mut lot = Self::load_advised(tx, key)?;
        if lot.state == LotState::Destroyed {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "not Destroyed",
                lot.state,
            ));
        }

        let from = lot.state;
        lot.state = LotState::Destroyed;
        Self::save_transition(tx, &lot, from)?;
        tx.del_index(LOT_INDEX, &lot.index_attributes())?;
        Ok(lot)
    }

    pub fn get(tx: &TxContext<'_>, key: &str) -> Result<Lot> {
        tx.load(key)
    }

    pub fn get_units(tx: &TxContext<'_>, key: &str) -> Result<String> {
        Ok(Self::get(tx, key)?.units)
    }

    pub fn get_advisor(tx: &TxContext<'_>, key: &str) -> Result<String> {
        Ok(Self::get(tx, key)?.advisor)
    }

    /// History of `key` followed by the history of the lot it was
    /// fractionated from, and so on up the lineage.
    ///
    /// The lineage is taken from the oldest recorded version of each lot.
    pub fn get_history(tx: &TxContext<'_>, key: &str) -> Result<Vec<HistoryRecord<Lot>>> {
        let mut records = Vec::new();
        let mut visited = BTreeSet::new();
        let mut next = Some(key.to_string());

        while let Some(current) = next.take() {
            if !visited.insert(current.clone()) {
                return Err(LedgerError::Validation(format!(
                    "lineage of lot {key} loops back to {current}"
                )));
            }
            let own = tx.history::<Lot>(&current)?;
            next = own
                .iter()
                .rev()
                .find_map(|entry| entry.record.as_ref())
                .map(|lot| lot.father_id.clone())
                .filter(|father| !father.is_empty());
            records.extend(own);
        }
        Ok(records)
    }

    /// Tree over the current `components` of `key`, each node carrying its
    /// lineage history.
    pub fn get_traceability(tx: &TxContext<'_>, key: &str) -> Result<TraceabilityResult> {
        let mut path = Vec::new();
        Self::trace(tx, key, &mut path)
    }

    fn trace(tx: &TxContext<'_>, key: &str, path: &mut Vec<String>) -> Result<TraceabilityResult> {
        if path.iter().any(|ancestor| ancestor == key) {
            return Err(LedgerError::Validation(format!(
                "lot {key} is a component of itself"
            )));
        }
        let history = Self::get_history(tx, key)?;
        let lot = Self::get(tx, key)?;

        path.push(key.to_string());
        let mut child_traceabilities = Vec::with_capacity(lot.components.len());
        for component in &lot.components {
            child_traceabilities.push(Self::trace(tx, component, path)?);
        }
        path.pop();

        Ok(TraceabilityResult {
            traced_lot_id: key.to_string(),
            history,
            child_traceabilities,
        })
    }

    fn is_in(tx: &TxContext<'_>, key: &str, state: LotState) -> Result<bool> {
        Ok(Self::get(tx, key)?.state == state)
    }

    pub fn is_using(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        Self::is_in(tx, key, LotState::Using)
    }

    pub fn is_reparing(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        Self::is_in(tx, key, LotState::Repairing)
    }

    pub fn is_stored(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        Self::is_in(tx, key, LotState::Stored)
    }

    pub fn is_manufacturing(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        Self::is_in(tx, key, LotState::Manufacturing)
    }

    pub fn is_selled(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        Self::is_in(tx, key, LotState::Selled)
    }

    /// Ids of every lot that has not been destroyed.
    pub fn list(tx: &TxContext<'_>) -> Result<Vec<String>> {
        tx.index_keys(LOT_INDEX)
    }
}
