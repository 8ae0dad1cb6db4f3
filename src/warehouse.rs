//! Warehouses: keep a list of stored lots and sell, return, ship or scrap
//! them.
use std::fmt;

use tracing::debug;

use crate::context::TxContext;
use crate::error::{LedgerError, Result};
use crate::history::HistoryRecord;
use crate::lot::{Lot, LotController};
use crate::operation::{Contract, operations};
use crate::record::{Record, ensure_unlisted, position_in};
use crate::types::{Capacity, Certification, Location, Price, Relocation};

pub const WAREHOUSE_INDEX: &str = "warehouse";
const ENTITY: &str = "warehouse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum WarehouseState {
    #[n(0)]
    Working,
    #[n(1)]
    NonAvailable,
    #[n(2)]
    Destroyed,
}

impl WarehouseState {
    pub fn name(self) -> &'static str {
        match self {
            WarehouseState::Working => "Working",
            WarehouseState::NonAvailable => "NonAvailable",
            WarehouseState::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for WarehouseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Warehouse {
    #[n(0)]
    pub doc_type: String,
    #[n(1)]
    pub warehouse_id: String,
    #[n(2)]
    pub owner_id: String,
    #[n(3)]
    pub advisor_id: String,
    #[n(4)]
    pub capacity: Capacity,
    #[n(5)]
    pub location: Location,
    #[n(6)]
    pub certifications: Vec<Certification>,
    #[n(7)]
    pub storing: Vec<String>,
    #[n(8)]
    pub state: WarehouseState,
}

impl Record for Warehouse {
    const DOC_TYPE: &'static str = "warehouse";

    fn doc_type(&self) -> &str {
        &self.doc_type
    }
}

impl Warehouse {
    fn index_attributes(&self) -> [&str; 2] {
        [self.warehouse_id.as_str(), self.owner_id.as_str()]
    }
}

operations! {
    pub enum WarehouseOperation for "warehouse" {
        Create => "CreateWarehouse": Submit,
        Inspection => "WarehouseInspection": Submit,
        InspectionLot => "LotInspection": Submit,
        StoreLot => "StoreLot": Submit,
        ReceiveSelledReturn => "ReceiveSelledReturn": Submit,
        SellLot => "SellLot": Submit,
        TransportLot => "TransportLot": Submit,
        ReturnLot => "ReturnLot": Submit,
        DestroyLot => "DestroyLot": Submit,
        UpdateAdvisor => "UpdateAdvisor": Submit,
        Available => "WarehouseAvailable": Submit,
        NonAvailable => "WarehouseNonAvailable": Submit,
        Destroy => "WarehouseDestroyed": Submit,
        Get => "GetWarehouse": Evaluate,
        GetHistory => "GetWarehouseHistory": Evaluate,
        StoredLots => "GetStoredLots": Evaluate,
        List => "ListWarehouses": Evaluate,
    }
}

pub struct WarehouseController;

impl Contract for WarehouseController {
    type Operation = WarehouseOperation;
}

impl WarehouseController {
    fn load_advised(tx: &TxContext<'_>, key: &str) -> Result<Warehouse> {
        let warehouse: Warehouse = tx.load(key)?;
        tx.require_advisor(ENTITY, key, &warehouse.advisor_id)?;
        Ok(warehouse)
    }

    fn load_in(tx: &TxContext<'_>, key: &str, expected: WarehouseState) -> Result<Warehouse> {
        let warehouse = Self::load_advised(tx, key)?;
        if warehouse.state != expected {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                expected.name(),
                warehouse.state,
            ));
        }
        Ok(warehouse)
    }

    fn advance(
        tx: &mut TxContext<'_>,
        key: &str,
        from: WarehouseState,
        to: WarehouseState,
    ) -> Result<Warehouse> {
        let mut warehouse = Self::load_in(tx, key, from)?;
        warehouse.state = to;
        tx.store(key, &warehouse)?;
        debug!(warehouse = key, from = %from, to = %to, "warehouse state changed");
        Ok(warehouse)
    }

    fn advised_lot(tx: &TxContext<'_>, lot_key: &str) -> Result<Lot> {
        let lot = LotController::get(tx, lot_key)?;
        tx.require_advisor("lot", lot_key, &lot.advisor)?;
        Ok(lot)
    }

    /// Runs `release` on a stored lot and takes it off the storing list.
    fn release<F>(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        capacity_used: &str,
        release: F,
    ) -> Result<Lot>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<Lot>,
    {
        let mut warehouse = Self::load_in(tx, key, WarehouseState::Working)?;
        Self::advised_lot(tx, lot_key)?;
        let index = position_in(&warehouse.storing, lot_key, "storing", key)?;

        let lot = release(&mut *tx)?;

        warehouse.storing.remove(index);
        warehouse.capacity.used = capacity_used.to_string();
        tx.store(key, &warehouse)?;
        debug!(warehouse = key, lot = lot_key, state = %lot.state, "lot left the warehouse");
        Ok(lot)
    }

    pub fn create(
        tx: &mut TxContext<'_>,
        key: &str,
        capacity: Capacity,
        location: Location,
    ) -> Result<Warehouse> {
        tx.require_role("abac.administrator")?;
        tx.require_absent(ENTITY, key)?;
        let owner_id = tx.require_same_org()?;
        let advisor_id = tx.principal()?;

        let warehouse = Warehouse {
            doc_type: Warehouse::DOC_TYPE.to_string(),
            warehouse_id: key.to_string(),
            owner_id,
            advisor_id,
            capacity,
            location,
            certifications: Vec::new(),
            storing: Vec::new(),
            state: WarehouseState::Working,
        };
        tx.store(key, &warehouse)?;
        tx.put_index(WAREHOUSE_INDEX, &warehouse.index_attributes())?;
        debug!(warehouse = key, owner = %warehouse.owner_id, "warehouse created");
        Ok(warehouse)
    }

    pub fn inspection(tx: &mut TxContext<'_>, key: &str, certification: Certification) -> Result<Warehouse> {
        let mut warehouse = Self::load_advised(tx, key)?;
        if warehouse.state == WarehouseState::Destroyed {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "not Destroyed",
                warehouse.state,
            ));
        }
        warehouse.certifications.push(certification);
        tx.store(key, &warehouse)?;
        Ok(warehouse)
    }

    pub fn inspection_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        certification: Certification,
    ) -> Result<Lot> {
        let warehouse = Self::load_in(tx, key, WarehouseState::Working)?;
        position_in(&warehouse.storing, lot_key, "storing", key)?;
        LotController::inspection(tx, lot_key, certification)
    }

    /// Lists a lot that has been stored here.
    pub fn store_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        capacity_used: &str,
    ) -> Result<Warehouse> {
        let mut warehouse = Self::load_in(tx, key, WarehouseState::Working)?;
        let lot = Self::advised_lot(tx, lot_key)?;
        if !LotController::is_stored(tx, lot_key)? {
            return Err(LedgerError::invalid_state("lot", lot_key, "Stored", lot.state));
        }
        ensure_unlisted(&[("storing", warehouse.storing.as_slice())], lot_key, key)?;

        warehouse.storing.push(lot_key.to_string());
        warehouse.capacity.used = capacity_used.to_string();
        tx.store(key, &warehouse)?;
        Ok(warehouse)
    }

    /// Takes back a sold lot; it is stored here again, marked broken.
    pub fn receive_selled_return(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        new_owner: &str,
        to: &Relocation,
        capacity_used: &str,
    ) -> Result<Lot> {
        let mut warehouse = Self::load_in(tx, key, WarehouseState::Working)?;
        let lot = Self::advised_lot(tx, lot_key)?;
        if !LotController::is_selled(tx, lot_key)? {
            return Err(LedgerError::invalid_state("lot", lot_key, "Selled", lot.state));
        }
        ensure_unlisted(&[("storing", warehouse.storing.as_slice())], lot_key, key)?;

        let lot = LotController::return_lot(tx, lot_key, to, new_owner)?;
        warehouse.storing.push(lot_key.to_string());
        warehouse.capacity.used = capacity_used.to_string();
        tx.store(key, &warehouse)?;
        Ok(lot)
    }

    pub fn sell_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        price: Price,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::release(tx, key, lot_key, capacity_used, |tx| {
            LotController::sell(tx, lot_key, price)
        })
    }

    pub fn transport_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        to: &Relocation,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::release(tx, key, lot_key, capacity_used, |tx| {
            LotController::transport(tx, lot_key, to)
        })
    }

    /// Sends a stored lot back on the road, marked broken.
    pub fn return_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        new_owner: &str,
        to: &Relocation,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::release(tx, key, lot_key, capacity_used, |tx| {
            LotController::return_lot(tx, lot_key, to, new_owner)
        })
    }

    pub fn destroy_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::release(tx, key, lot_key, capacity_used, |tx| {
            LotController::destroy(tx, lot_key)
        })
    }

    pub fn update_advisor(tx: &mut TxContext<'_>, key: &str, new_advisor: &str) -> Result<Warehouse> {
        let mut warehouse = Self::load_in(tx, key, WarehouseState::Working)?;
        if new_advisor.is_empty() {
            return Err(LedgerError::Validation("new advisor must not be empty".to_string()));
        }
        warehouse.advisor_id = new_advisor.to_string();
        tx.store(key, &warehouse)?;
        Ok(warehouse)
    }

    pub fn available(tx: &mut TxContext<'_>, key: &str) -> Result<Warehouse> {
        Self::advance(tx, key, WarehouseState::NonAvailable, WarehouseState::Working)
    }

    pub fn non_available(tx: &mut TxContext<'_>, key: &str) -> Result<Warehouse> {
        Self::advance(tx, key, WarehouseState::Working, WarehouseState::NonAvailable)
    }

    pub fn destroy(tx: &mut TxContext<'_>, key: &str) -> Result<Warehouse> {
        let warehouse = Self::advance(tx, key, WarehouseState::NonAvailable, WarehouseState::Destroyed)?;
        tx.del_index(WAREHOUSE_INDEX, &warehouse.index_attributes())?;
        Ok(warehouse)
    }

    pub fn get(tx: &TxContext<'_>, key: &str) -> Result<Warehouse> {
        tx.load(key)
    }

    pub fn get_history(tx: &TxContext<'_>, key: &str) -> Result<Vec<HistoryRecord<Warehouse>>> {
        tx.history(key)
    }

    pub fn stored_lots(tx: &TxContext<'_>, key: &str) -> Result<Vec<String>> {
        Ok(Self::get(tx, key)?.storing)
    }

    pub fn list(tx: &TxContext<'_>) -> Result<Vec<String>> {
        tx.index_keys(WAREHOUSE_INDEX)
    }
}
