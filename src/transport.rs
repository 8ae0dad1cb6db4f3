//! Transports: carry a shipment of lots and deliver them one by one.
use std::fmt;

use tracing::debug;

use crate::context::TxContext;
use crate::error::{LedgerError, Result};
use crate::history::HistoryRecord;
use crate::lot::{Lot, LotController};
use crate::operation::{Contract, operations};
use crate::record::{Record, ensure_distinct, position_in};
use crate::types::{Capacity, Certification, Location, Price, Relocation, Transporting};

pub const TRANSPORT_INDEX: &str = "transport";
const ENTITY: &str = "transport";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum TransportState {
    #[n(0)]
    Available,
    #[n(1)]
    Loading,
    #[n(2)]
    Delivering,
    #[n(3)]
    NonAvailable,
    #[n(4)]
    Destroyed,
}

impl TransportState {
    pub fn name(self) -> &'static str {
        match self {
            TransportState::Available => "Available",
            TransportState::Loading => "Loading",
            TransportState::Delivering => "Delivering",
            TransportState::NonAvailable => "NonAvailable",
            TransportState::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Transport {
    #[n(0)]
    pub doc_type: String,
    #[n(1)]
    pub transport_id: String,
    #[n(2)]
    pub owner_id: String,
    #[n(3)]
    pub advisor_id: String,
    #[n(4)]
    pub capacity: Capacity,
    #[n(5)]
    pub location: Location,
    #[n(6)]
    pub state: TransportState,
    #[n(7)]
    pub transport_type: String,
    #[n(8)]
    pub certifications: Vec<Certification>,
    #[n(9)]
    pub transporting: Transporting,
    /// Lots aboard, in loading order.
    #[n(10)]
    pub shipment: Vec<String>,
}

impl Record for Transport {
    const DOC_TYPE: &'static str = "transport";

    fn doc_type(&self) -> &str {
        &self.doc_type
    }
}

impl Transport {
    fn index_attributes(&self) -> [&str; 2] {
        [self.transport_id.as_str(), self.owner_id.as_str()]
    }
}

operations! {
    pub enum TransportOperation for "transport" {
        Create => "CreateTransport": Submit,
        Inspection => "TransportInspection": Submit,
        UpdateAdvisor => "UpdateAdvisor": Submit,
        UpdateLocation => "UpdateLocation": Submit,
        LoadLots => "LoadLotsInTransport": Submit,
        StartDelivery => "StartDelivery": Submit,
        InspectionLot => "LotInspection": Submit,
        DeliverStore => "StoreLot": Submit,
        DeliverRepairing => "ReparingLot": Submit,
        DeliverUsing => "UsingLot": Submit,
        DeliverTransfer => "TransferLot": Submit,
        DeliverTransshipment => "TransshipmentLot": Submit,
        NonAvailable => "TransportNonAvailable": Submit,
        Available => "TransportAvailable": Submit,
        Destroy => "TransportDestroyed": Submit,
        Get => "GetTransport": Evaluate,
        GetHistory => "GetTransportHistory": Evaluate,
        DeliveringLots => "GetDeliveringLots": Evaluate,
        List => "ListTransports": Evaluate,
    }
}

pub struct TransportController;

impl Contract for TransportController {
    type Operation = TransportOperation;
}

impl TransportController {
    fn load_advised(tx: &TxContext<'_>, key: &str) -> Result<Transport> {
        let transport: Transport = tx.load(key)?;
        tx.require_advisor(ENTITY, key, &transport.advisor_id)?;
        Ok(transport)
    }

    fn load_in(tx: &TxContext<'_>, key: &str, expected: TransportState) -> Result<Transport> {
        let transport = Self::load_advised(tx, key)?;
        if transport.state != expected {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                expected.name(),
                transport.state,
            ));
        }
        Ok(transport)
    }

    fn load_not_destroyed(tx: &TxContext<'_>, key: &str) -> Result<Transport> {
        let transport = Self::load_advised(tx, key)?;
        if transport.state == TransportState::Destroyed {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "not Destroyed",
                transport.state,
            ));
        }
        Ok(transport)
    }

    fn save_transition(tx: &mut TxContext<'_>, transport: &Transport, from: TransportState) -> Result<()> {
        if from != transport.state {
            debug!(
                transport = %transport.transport_id,
                from = %from,
                to = %transport.state,
                "transport state changed"
            );
        }
        tx.store(&transport.transport_id, transport)
    }

    pub fn create(
        tx: &mut TxContext<'_>,
        key: &str,
        capacity: Capacity,
        location: Location,
        transport_type: &str,
    ) -> Result<Transport> {
        tx.require_role("abac.administrator")?;
        tx.require_absent(ENTITY, key)?;
        let owner_id = tx.require_same_org()?;
        let advisor_id = tx.principal()?;

        let transport = Transport {
            doc_type: Transport::DOC_TYPE.to_string(),
            transport_id: key.to_string(),
            owner_id,
            advisor_id,
            capacity,
            location,
            state: TransportState::Available,
            transport_type: transport_type.to_string(),
            certifications: Vec::new(),
            transporting: Transporting::default(),
            shipment: Vec::new(),
        };
        tx.store(key, &transport)?;
        tx.put_index(TRANSPORT_INDEX, &transport.index_attributes())?;
        debug!(transport = key, owner = %transport.owner_id, "transport created");
        Ok(transport)
    }

    pub fn inspection(tx: &mut TxContext<'_>, key: &str, certification: Certification) -> Result<Transport> {
        let mut transport = Self::load_in(tx, key, TransportState::Available)?;
        transport.certifications.push(certification);
        tx.store(key, &transport)?;
        Ok(transport)
    }

    pub fn update_advisor(tx: &mut TxContext<'_>, key: &str, new_advisor: &str) -> Result<Transport> {
        let mut transport = Self::load_not_destroyed(tx, key)?;
        if new_advisor.is_empty() {
            return Err(LedgerError::Validation("new advisor must not be empty".to_string()));
        }
        transport.advisor_id = new_advisor.to_string();
        tx.store(key, &transport)?;
        Ok(transport)
    }

    pub fn update_location(tx: &mut TxContext<'_>, key: &str, location: Location) -> Result<Transport> {
        let mut transport = Self::load_not_destroyed(tx, key)?;
        transport.location = location;
        tx.store(key, &transport)?;
        Ok(transport)
    }

    /// Puts `lots` aboard an available transport.
    pub fn load_lots(
        tx: &mut TxContext<'_>,
        key: &str,
        capacity_used: &str,
        lots: &[String],
    ) -> Result<Transport> {
        let mut transport = Self::load_in(tx, key, TransportState::Available)?;
        if lots.is_empty() {
            return Err(LedgerError::Validation(format!(
                "nothing to load on transport {key}"
            )));
        }
        ensure_distinct(lots.iter().map(String::as_str))?;
        for lot_key in lots {
            let advisor = LotController::get_advisor(tx, lot_key)?;
            tx.require_advisor("lot", lot_key, &advisor)?;
        }

        let from = transport.state;
        transport.capacity.used = capacity_used.to_string();
        transport.shipment.extend(lots.iter().cloned());
        transport.state = TransportState::Loading;
        Self::save_transition(tx, &transport, from)?;
        Ok(transport)
    }

    pub fn start_delivery(
        tx: &mut TxContext<'_>,
        key: &str,
        destination: Location,
        finish_time: &str,
    ) -> Result<Transport> {
        let mut transport = Self::load_in(tx, key, TransportState::Loading)?;

        let from = transport.state;
        transport.transporting = Transporting {
            destination,
            finish_time: finish_time.to_string(),
        };
        transport.state = TransportState::Delivering;
        Self::save_transition(tx, &transport, from)?;
        Ok(transport)
    }

    pub fn inspection_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        certification: Certification,
    ) -> Result<Lot> {
        let transport = Self::load_in(tx, key, TransportState::Delivering)?;
        position_in(&transport.shipment, lot_key, "shipment", key)?;
        LotController::inspection(tx, lot_key, certification)
    }

    /// Common frame of every delivery: checks the transport is delivering,
    /// the caller advises the lot and the lot is aboard, runs `deliver` and
    /// unloads the lot. An empty transport becomes available again.
    fn deliver<F>(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        capacity_used: &str,
        deliver: F,
    ) -> Result<Lot>
    where
        F: FnOnce(&mut TxContext<'_>) -> Result<Lot>,
    {
        let mut transport = Self::load_in(tx, key, TransportState::Delivering)?;
        let advisor = LotController::get_advisor(tx, lot_key)?;
        tx.require_advisor("lot", lot_key, &advisor)?;
        let index = position_in(&transport.shipment, lot_key, "shipment", key)?;

        let lot = deliver(&mut *tx)?;

        let from = transport.state;
        transport.shipment.remove(index);
        transport.capacity.used = capacity_used.to_string();
        if transport.shipment.is_empty() {
            transport.state = TransportState::Available;
        }
        Self::save_transition(tx, &transport, from)?;
        debug!(transport = key, lot = lot_key, state = %lot.state, "lot delivered");
        Ok(lot)
    }

    pub fn deliver_store(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        to: &Relocation,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::deliver(tx, key, lot_key, capacity_used, |tx| {
            LotController::store(tx, lot_key, to)
        })
    }

    pub fn deliver_repairing(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        to: &Relocation,
        new_owner: &str,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::deliver(tx, key, lot_key, capacity_used, |tx| {
            LotController::put_on_reparation(tx, lot_key, to, new_owner)
        })
    }

    pub fn deliver_using(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        to: &Relocation,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::deliver(tx, key, lot_key, capacity_used, |tx| {
            LotController::put_on_using(tx, lot_key, to)
        })
    }

    pub fn deliver_transfer(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        to: &Relocation,
        new_owner: &str,
        price: Price,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::deliver(tx, key, lot_key, capacity_used, |tx| {
            LotController::transfer(tx, lot_key, to, new_owner, price)
        })
    }

    /// Hands a lot over to another carrier; the lot stays Transporting.
    pub fn deliver_transshipment(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        to: &Relocation,
        capacity_used: &str,
    ) -> Result<Lot> {
        Self::deliver(tx, key, lot_key, capacity_used, |tx| {
            LotController::transshipment(tx, lot_key, to)
        })
    }

    pub fn non_available(tx: &mut TxContext<'_>, key: &str) -> Result<Transport> {
        let mut transport = Self::load_in(tx, key, TransportState::Available)?;
        transport.state = TransportState::NonAvailable;
        Self::save_transition(tx, &transport, TransportState::Available)?;
        Ok(transport)
    }

    pub fn available(tx: &mut TxContext<'_>, key: &str) -> Result<Transport> {
        let mut transport = Self::load_in(tx, key, TransportState::NonAvailable)?;
        transport.state = TransportState::Available;
        Self::save_transition(tx, &transport, TransportState::NonAvailable)?;
        Ok(transport)
    }

    pub fn destroy(tx: &mut TxContext<'_>, key: &str) -> Result<Transport> {
        let mut transport = Self::load_not_destroyed(tx, key)?;
        let from = transport.state;
        transport.state = TransportState::Destroyed;
        Self::save_transition(tx, &transport, from)?;
        tx.del_index(TRANSPORT_INDEX, &transport.index_attributes())?;
        Ok(transport)
    }

    pub fn get(tx: &TxContext<'_>, key: &str) -> Result<Transport> {
        tx.load(key)
    }

    pub fn get_history(tx: &TxContext<'_>, key: &str) -> Result<Vec<HistoryRecord<Transport>>> {
        tx.history(key)
    }

    pub fn delivering_lots(tx: &TxContext<'_>, key: &str) -> Result<Vec<String>> {
        Ok(Self::get(tx, key)?.shipment)
    }

    pub fn list(tx: &TxContext<'_>) -> Result<Vec<String>> {
        tx.index_keys(TRANSPORT_INDEX)
    }
}
