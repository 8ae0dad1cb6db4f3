//! Manufacturing sites: produce lots from raw-material lots and keep the
//! lots they hold in production, to-use and to-repair lists.
use std::fmt;

use tracing::debug;

use crate::context::TxContext;
use crate::error::{LedgerError, Result};
use crate::history::HistoryRecord;
use crate::lot::{Lot, LotController, LotState, NewLot};
use crate::operation::{Contract, operations};
use crate::product::{Product, ProductController, ProductSpec};
use crate::record::{Record, ensure_distinct, ensure_unlisted, position_in};
use crate::types::{Certification, Environment, Location, Price, Relocation, parse_units};

pub const SITE_INDEX: &str = "manufacture";
const ENTITY: &str = "manufacture";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum SiteState {
    #[n(0)]
    OnProduction,
    #[n(1)]
    Broken,
    #[n(2)]
    Destroyed,
}

impl SiteState {
    pub fn name(self) -> &'static str {
        match self {
            SiteState::OnProduction => "OnProduction",
            SiteState::Broken => "Broken",
            SiteState::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for SiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct ManufacturingSite {
    #[n(0)]
    pub doc_type: String,
    #[n(1)]
    pub manufacture_id: String,
    #[n(2)]
    pub owner_id: String,
    #[n(3)]
    pub advisor_id: String,
    #[n(4)]
    pub location: Location,
    #[n(5)]
    pub certifications: Vec<Certification>,
    /// Lots made here and not yet shipped or put to use.
    #[n(6)]
    pub production: Vec<String>,
    /// Raw-material lots available for new lots.
    #[n(7)]
    pub to_use: Vec<String>,
    #[n(8)]
    pub to_repair: Vec<String>,
    #[n(9)]
    pub state: SiteState,
}

impl Record for ManufacturingSite {
    const DOC_TYPE: &'static str = "manufacture";

    fn doc_type(&self) -> &str {
        &self.doc_type
    }
}

impl ManufacturingSite {
    fn index_attributes(&self) -> [&str; 2] {
        [self.manufacture_id.as_str(), self.owner_id.as_str()]
    }

    fn lists(&self) -> [(&'static str, &[String]); 3] {
        [
            ("production", self.production.as_slice()),
            ("to-use", self.to_use.as_slice()),
            ("to-repair", self.to_repair.as_slice()),
        ]
    }
}

/// A lot produced at a site out of lots from its to-use list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotOrder {
    pub key: String,
    pub product_id: String,
    pub price: Price,
    pub units: String,
    pub environment: Environment,
    /// `"lotId:units"` entries; blank entries are ignored.
    pub components: Vec<String>,
}

/// Parses `"lotId:units"` component entries, skipping blank ones.
pub fn parse_component_specs(specs: &[String]) -> Result<Vec<(String, u64)>> {
    let mut parsed = Vec::with_capacity(specs.len());
    for spec in specs.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let (id, units) = spec.split_once(':').ok_or_else(|| {
            LedgerError::Validation(format!("component {spec:?} is not of the form lotId:units"))
        })?;
        let id = id.trim();
        if id.is_empty() {
            return Err(LedgerError::Validation(format!(
                "component {spec:?} has no lot id"
            )));
        }
        parsed.push((id.to_string(), parse_units("component units", units)?));
    }
    ensure_distinct(parsed.iter().map(|(id, _)| id.as_str()))?;
    Ok(parsed)
}

operations! {
    pub enum SiteOperation for "manufacture" {
        Create => "CreateManufacture": Submit,
        Inspection => "ManufactureInspection": Submit,
        CreateProduct => "CreateProduct": Submit,
        CertifyProduct => "CertifyProduct": Submit,
        StartProduction => "StartProductProduction": Submit,
        DiscontinueProduct => "DiscontinueProduct": Submit,
        ContinueProduct => "ContinueProductProduction": Submit,
        DestroyProduct => "DestroyProduct": Submit,
        CreateLot => "CreateLot": Submit,
        FractionateForUse => "FractionateLotsForUse": Submit,
        PutLotInUsing => "PutLotInUsing": Submit,
        PutLotFromProductionToUsing => "PutLotFromProductionToUsing": Submit,
        PutLotInReparing => "PutLotInReparing": Submit,
        RepairLot => "RepairLot": Submit,
        InspectionLot => "LotInspection": Submit,
        DestroyLot => "DestroyLot": Submit,
        TransportLot => "TransportLot": Submit,
        UpdateAdvisor => "UpdateAdvisor": Submit,
        Broken => "ManufactureBroken": Submit,
        ReadyToProduce => "ManufactureReadyToProduce": Submit,
        Destroy => "ManufactureDestroyed": Submit,
        Get => "GetManufacture": Evaluate,
        GetHistory => "GetManufactureHistory": Evaluate,
        ProducingLots => "GetProducingLots": Evaluate,
        UsingLots => "GetUsingLots": Evaluate,
        RepairingLots => "GetRepairingLots": Evaluate,
        List => "ListManufactures": Evaluate,
    }
}

pub struct ManufactureController;

impl Contract for ManufactureController {
    type Operation = SiteOperation;
}

impl ManufactureController {
    fn load_advised(tx: &TxContext<'_>, key: &str) -> Result<ManufacturingSite> {
        let site: ManufacturingSite = tx.load(key)?;
        tx.require_advisor(ENTITY, key, &site.advisor_id)?;
        Ok(site)
    }

    /// Loads a site the caller advises and that is producing.
    fn load_producing(tx: &TxContext<'_>, key: &str) -> Result<ManufacturingSite> {
        let site = Self::load_advised(tx, key)?;
        Self::expect_state(&site, SiteState::OnProduction)?;
        Ok(site)
    }

    fn expect_state(site: &ManufacturingSite, expected: SiteState) -> Result<()> {
        if site.state != expected {
            return Err(LedgerError::invalid_state(
                ENTITY,
                &site.manufacture_id,
                expected.name(),
                site.state,
            ));
        }
        Ok(())
    }

    fn advance(tx: &mut TxContext<'_>, key: &str, from: SiteState, to: SiteState) -> Result<ManufacturingSite> {
        let mut site = Self::load_advised(tx, key)?;
        Self::expect_state(&site, from)?;
        site.state = to;
        tx.store(key, &site)?;
        debug!(site = key, from = %from, to = %to, "site state changed");
        Ok(site)
    }

    /// Reads the lot through the lot contract and checks the caller advises it.
    fn advised_lot(tx: &TxContext<'_>, lot_key: &str) -> Result<Lot> {
        let lot = LotController::get(tx, lot_key)?;
        tx.require_advisor("lot", lot_key, &lot.advisor)?;
        Ok(lot)
    }

    fn expect_lot(lot_key: &str, holds: bool, expected: &str, lot: &Lot) -> Result<()> {
        if !holds {
            return Err(LedgerError::invalid_state("lot", lot_key, expected, lot.state));
        }
        Ok(())
    }

    pub fn create(tx: &mut TxContext<'_>, key: &str, location: Location) -> Result<ManufacturingSite> {
        tx.require_role("abac.administrator")?;
        tx.require_absent(ENTITY, key)?;
        let owner_id = tx.require_same_org()?;
        let advisor_id = tx.principal()?;

        let site = ManufacturingSite {
            doc_type: ManufacturingSite::DOC_TYPE.to_string(),
            manufacture_id: key.to_string(),
            owner_id,
            advisor_id,
            location,
            certifications: Vec::new(),
            production: Vec::new(),
            to_use: Vec::new(),
            to_repair: Vec::new(),
            state: SiteState::OnProduction,
        };
        tx.store(key, &site)?;
        tx.put_index(SITE_INDEX, &site.index_attributes())?;
        debug!(site = key, owner = %site.owner_id, "site created");
        Ok(site)
    }

    pub fn inspection(tx: &mut TxContext<'_>, key: &str, certification: Certification) -> Result<ManufacturingSite> {
        let mut site = Self::load_advised(tx, key)?;
        if site.state == SiteState::Destroyed {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                "not Destroyed",
                site.state,
            ));
        }
        site.certifications.push(certification);
        tx.store(key, &site)?;
        Ok(site)
    }

    pub fn create_product(tx: &mut TxContext<'_>, key: &str, spec: ProductSpec) -> Result<Product> {
        Self::load_producing(tx, key)?;
        for component in &spec.components {
            if !ProductController::exists(tx, component)? {
                return Err(LedgerError::not_found("product", component));
            }
        }
        ProductController::create(tx, spec, key)
    }

    pub fn certify_product(
        tx: &mut TxContext<'_>,
        key: &str,
        product_key: &str,
        certification: Certification,
    ) -> Result<Product> {
        Self::load_producing(tx, key)?;
        ProductController::certify(tx, product_key, certification)
    }

    pub fn start_product_production(tx: &mut TxContext<'_>, key: &str, product_key: &str) -> Result<Product> {
        Self::load_producing(tx, key)?;
        ProductController::start_production(tx, product_key)
    }

    pub fn discontinue_product(tx: &mut TxContext<'_>, key: &str, product_key: &str) -> Result<Product> {
        Self::load_producing(tx, key)?;
        ProductController::discontinue(tx, product_key)
    }

    pub fn continue_product_production(tx: &mut TxContext<'_>, key: &str, product_key: &str) -> Result<Product> {
        Self::load_producing(tx, key)?;
        ProductController::continue_production(tx, product_key)
    }

    pub fn destroy_product(tx: &mut TxContext<'_>, key: &str, product_key: &str) -> Result<Product> {
        Self::load_producing(tx, key)?;
        ProductController::destroy(tx, product_key)
    }

    /// Builds a new lot out of whole lots from the to-use list.
    ///
    /// Every component must be consumed entirely: a lot holding more units
    /// than requested has to go through [`Self::fractionate_for_use`] first.
    /// All checks run before the first write.
    pub fn create_lot(tx: &mut TxContext<'_>, key: &str, order: LotOrder) -> Result<Lot> {
        let mut site = Self::load_producing(tx, key)?;
        if !ProductController::exists(tx, &order.product_id)? {
            return Err(LedgerError::not_found("product", &order.product_id));
        }

        let components = parse_component_specs(&order.components)?;
        let new = NewLot {
            key: order.key,
            product_id: order.product_id,
            manufacture_id: key.to_string(),
            price: order.price,
            units: order.units,
            environment: order.environment,
            components: components.iter().map(|(id, _)| id.clone()).collect(),
            current_location_id: key.to_string(),
        };
        LotController::check_new(tx, &new)?;

        for (lot_key, requested) in &components {
            let lot = LotController::get(tx, lot_key)?;
            position_in(&site.to_use, lot_key, "to-use", key)?;
            tx.require_advisor("lot", lot_key, &lot.advisor)?;
            if lot.state == LotState::Destroyed {
                return Err(LedgerError::invalid_state("lot", lot_key, "not Destroyed", lot.state));
            }
            let available = parse_units("units", &lot.units)?;
            if available != *requested {
                return Err(LedgerError::Validation(format!(
                    "lot {lot_key} holds {available} units but {requested} were requested, fractionate it first"
                )));
            }
        }

        for (lot_key, _) in &components {
            LotController::destroy(tx, lot_key)?;
            site.to_use.retain(|id| id != lot_key);
        }

        let lot = LotController::create(tx, new)?;
        site.production.push(lot.lot_id.clone());
        tx.store(key, &site)?;
        Ok(lot)
    }

    /// Splits to-use lots so that each holds exactly the requested units.
    ///
    /// `specs` holds `"lotId:units"` entries and `new_ids` two fresh ids per
    /// entry, in order. Lots that already hold the requested amount are left
    /// alone and their pair of ids goes unused.
    pub fn fractionate_for_use(
        tx: &mut TxContext<'_>,
        key: &str,
        specs: &[String],
        new_ids: &[String],
    ) -> Result<ManufacturingSite> {
        let mut site = Self::load_producing(tx, key)?;
        let components = parse_component_specs(specs)?;
        if new_ids.len() != components.len() * 2 {
            return Err(LedgerError::Validation(format!(
                "{} lots to fractionate need {} new ids, got {}",
                components.len(),
                components.len() * 2,
                new_ids.len()
            )));
        }
        ensure_distinct(new_ids.iter().map(String::as_str))?;

        let mut splits = Vec::new();
        for ((lot_key, requested), ids) in components.iter().zip(new_ids.chunks(2)) {
            let lot = LotController::get(tx, lot_key)?;
            position_in(&site.to_use, lot_key, "to-use", key)?;
            tx.require_advisor("lot", lot_key, &lot.advisor)?;
            let available = parse_units("units", &lot.units)?;
            if available > *requested && !lot.state.can_fractionate() {
                return Err(LedgerError::invalid_state(
                    "lot",
                    lot_key,
                    "Stored, Using or Manufacturing",
                    lot.state,
                ));
            }
            if *requested == 0 || available < *requested {
                return Err(LedgerError::Validation(format!(
                    "lot {lot_key} holds {available} units, {requested} were requested"
                )));
            }
            if available > *requested {
                for id in ids {
                    tx.require_absent("lot", id)?;
                }
                splits.push((lot_key.as_str(), *requested, available - requested, ids));
            }
        }

        for (lot_key, requested, rest, ids) in splits {
            let (first, second) = LotController::fractionate(
                tx,
                lot_key,
                &requested.to_string(),
                &rest.to_string(),
                &ids[0],
                &ids[1],
            )?;
            site.to_use.retain(|id| id != lot_key);
            site.to_use.push(first.lot_id);
            site.to_use.push(second.lot_id);
        }
        tx.store(key, &site)?;
        Ok(site)
    }

    /// Lists a lot that is already in use at the site.
    pub fn put_lot_in_using(tx: &mut TxContext<'_>, key: &str, lot_key: &str) -> Result<ManufacturingSite> {
        let mut site = Self::load_producing(tx, key)?;
        let lot = Self::advised_lot(tx, lot_key)?;
        Self::expect_lot(lot_key, LotController::is_using(tx, lot_key)?, "Using", &lot)?;
        ensure_unlisted(&site.lists(), lot_key, key)?;

        site.to_use.push(lot_key.to_string());
        tx.store(key, &site)?;
        Ok(site)
    }

    /// Moves a freshly produced lot into the to-use list of the same site.
    pub fn put_lot_from_production_to_using(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        environment: Environment,
    ) -> Result<ManufacturingSite> {
        let mut site = Self::load_producing(tx, key)?;
        let index = position_in(&site.production, lot_key, "production", key)?;
        let lot = Self::advised_lot(tx, lot_key)?;
        Self::expect_lot(
            lot_key,
            LotController::is_manufacturing(tx, lot_key)?,
            "Manufacturing",
            &lot,
        )?;

        let here = Relocation {
            location_id: key.to_string(),
            new_advisor: site.advisor_id.clone(),
            environment,
        };
        LotController::put_on_using(tx, lot_key, &here)?;
        site.production.remove(index);
        site.to_use.push(lot_key.to_string());
        tx.store(key, &site)?;
        Ok(site)
    }

    pub fn put_lot_in_reparing(tx: &mut TxContext<'_>, key: &str, lot_key: &str) -> Result<ManufacturingSite> {
        let mut site = Self::load_producing(tx, key)?;
        let lot = Self::advised_lot(tx, lot_key)?;
        Self::expect_lot(lot_key, LotController::is_reparing(tx, lot_key)?, "Repairing", &lot)?;
        ensure_unlisted(&site.lists(), lot_key, key)?;

        site.to_repair.push(lot_key.to_string());
        tx.store(key, &site)?;
        Ok(site)
    }

    /// Repairs a lot from the to-repair list and sends it on its way.
    pub fn repair_lot(tx: &mut TxContext<'_>, key: &str, lot_key: &str, to: &Relocation) -> Result<Lot> {
        let mut site = Self::load_producing(tx, key)?;
        let index = position_in(&site.to_repair, lot_key, "to-repair", key)?;

        let lot = LotController::repair(tx, lot_key, to)?;
        site.to_repair.remove(index);
        tx.store(key, &site)?;
        Ok(lot)
    }

    pub fn inspection_lot(
        tx: &mut TxContext<'_>,
        key: &str,
        lot_key: &str,
        certification: Certification,
    ) -> Result<Lot> {
        let site = Self::load_producing(tx, key)?;
        if !site.lists().iter().any(|(_, list)| list.iter().any(|id| id == lot_key)) {
            return Err(LedgerError::Validation(format!(
                "lot {lot_key} is not held by site {key}"
            )));
        }
        LotController::inspection(tx, lot_key, certification)
    }

    /// Scraps a lot that could not be repaired.
    pub fn destroy_lot(tx: &mut TxContext<'_>, key: &str, lot_key: &str) -> Result<Lot> {
        let mut site = Self::load_producing(tx, key)?;
        let index = position_in(&site.to_repair, lot_key, "to-repair", key)?;

        let lot = LotController::destroy(tx, lot_key)?;
        site.to_repair.remove(index);
        tx.store(key, &site)?;
        Ok(lot)
    }

    /// Ships a lot out of the production list.
    pub fn transport_lot(tx: &mut TxContext<'_>, key: &str, lot_key: &str, to: &Relocation) -> Result<Lot> {
        let mut site = Self::load_producing(tx, key)?;
        let index = position_in(&site.production, lot_key, "production", key)?;

        let lot = LotController::transport(tx, lot_key, to)?;
        site.production.remove(index);
        tx.store(key, &site)?;
        Ok(lot)
    }

    pub fn update_advisor(tx: &mut TxContext<'_>, key: &str, new_advisor: &str) -> Result<ManufacturingSite> {
        let mut site = Self::load_producing(tx, key)?;
        if new_advisor.is_empty() {
            return Err(LedgerError::Validation("new advisor must not be empty".to_string()));
        }
        site.advisor_id = new_advisor.to_string();
        tx.store(key, &site)?;
        Ok(site)
    }

    pub fn broken(tx: &mut TxContext<'_>, key: &str) -> Result<ManufacturingSite> {
        Self::advance(tx, key, SiteState::OnProduction, SiteState::Broken)
    }

    pub fn ready_to_produce(tx: &mut TxContext<'_>, key: &str) -> Result<ManufacturingSite> {
        Self::advance(tx, key, SiteState::Broken, SiteState::OnProduction)
    }

    pub fn destroy(tx: &mut TxContext<'_>, key: &str) -> Result<ManufacturingSite> {
        let site = Self::advance(tx, key, SiteState::Broken, SiteState::Destroyed)?;
        tx.del_index(SITE_INDEX, &site.index_attributes())?;
        Ok(site)
    }

    pub fn get(tx: &TxContext<'_>, key: &str) -> Result<ManufacturingSite> {
        tx.load(key)
    }

    pub fn get_history(tx: &TxContext<'_>, key: &str) -> Result<Vec<HistoryRecord<ManufacturingSite>>> {
        tx.history(key)
    }

    pub fn producing_lots(tx: &TxContext<'_>, key: &str) -> Result<Vec<String>> {
        Ok(Self::get(tx, key)?.production)
    }

    pub fn using_lots(tx: &TxContext<'_>, key: &str) -> Result<Vec<String>> {
        Ok(Self::get(tx, key)?.to_use)
    }

    pub fn repairing_lots(tx: &TxContext<'_>, key: &str) -> Result<Vec<String>> {
        Ok(Self::get(tx, key)?.to_repair)
    }

    pub fn list(tx: &TxContext<'_>) -> Result<Vec<String>> {
        tx.index_keys(SITE_INDEX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::config::AccessPolicy;
    use crate::identity::{Authority, CallContext, HexCertIdentity};
    use crate::ledger::SledLedger;
    use std::sync::Arc;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn component_specs() {
        let parsed = parse_component_specs(&strings(&["L1:4", " ", "L2: 6"])).unwrap();
        assert_eq!(parsed, vec![("L1".to_string(), 4), ("L2".to_string(), 6)]);

        let cases: [&[&str]; 4] = [&["L1"], &[":4"], &["L1:x"], &["L1:1", "L1:2"]];
        for bad in cases {
            let err = parse_component_specs(&strings(bad)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn produce_use_and_consume() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("site.db")).unwrap();
        let ledger = SledLedger::new(Arc::new(db));
        let authority = Authority::permissive("Org1MSP");
        let alice = CallContext::new("alice", "Org1MSP");
        let mut raw = ledger.begin(b"alice");
        let mut tx = TxContext::new(&mut raw, &authority, &alice);

        ManufactureController::create(&mut tx, "SITE", Location::default()).unwrap();
        ManufactureController::create_product(
            &mut tx,
            "SITE",
            ProductSpec {
                key: "P1".into(),
                name: "Flour".into(),
                ..ProductSpec::default()
            },
        )
        .unwrap();

        let raw_lot = LotOrder {
            key: "RAW".into(),
            product_id: "P1".into(),
            units: "10".into(),
            ..LotOrder::default()
        };
        ManufactureController::create_lot(&mut tx, "SITE", raw_lot).unwrap();
        assert_eq!(
            ManufactureController::producing_lots(&tx, "SITE").unwrap(),
            vec!["RAW"]
        );

        ManufactureController::put_lot_from_production_to_using(
            &mut tx,
            "SITE",
            "RAW",
            Environment::default(),
        )
        .unwrap();
        assert!(LotController::is_using(&tx, "RAW").unwrap());
        let site = ManufactureController::get(&tx, "SITE").unwrap();
        assert!(site.production.is_empty());
        assert_eq!(site.to_use, vec!["RAW"]);

        let partial = LotOrder {
            key: "BREAD".into(),
            product_id: "P1".into(),
            units: "2".into(),
            components: strings(&["RAW:4"]),
            ..LotOrder::default()
        };
        let err = ManufactureController::create_lot(&mut tx, "SITE", partial.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!LotController::exists(&tx, "BREAD").unwrap());

        ManufactureController::fractionate_for_use(
            &mut tx,
            "SITE",
            &strings(&["RAW:4"]),
            &strings(&["R1", "R2"]),
        )
        .unwrap();
        let site = ManufactureController::get(&tx, "SITE").unwrap();
        assert_eq!(site.to_use, vec!["R1", "R2"]);
        assert_eq!(LotController::get_units(&tx, "R2").unwrap(), "6");

        let order = LotOrder {
            components: strings(&["R1:4"]),
            ..partial
        };
        let bread = ManufactureController::create_lot(&mut tx, "SITE", order).unwrap();
        assert_eq!(bread.components, vec!["R1"]);
        assert_eq!(bread.manufacture_id, "SITE");
        assert_eq!(bread.father_id, "");
        assert_eq!(LotController::get(&tx, "R1").unwrap().state, LotState::Destroyed);

        let site = ManufactureController::get(&tx, "SITE").unwrap();
        assert_eq!(site.to_use, vec!["R2"]);
        assert_eq!(site.production, vec!["BREAD"]);
    }

    /// Creates a site producing `P1` and moves lots of 10 units each into
    /// its to-use list.
    fn site_with_raw_lots(tx: &mut TxContext<'_>, lots: &[&str]) {
        ManufactureController::create(tx, "SITE", Location::default()).unwrap();
        ManufactureController::create_product(
            tx,
            "SITE",
            ProductSpec {
                key: "P1".into(),
                name: "Flour".into(),
                ..ProductSpec::default()
            },
        )
        .unwrap();
        for lot in lots {
            let order = LotOrder {
                key: lot.to_string(),
                product_id: "P1".into(),
                units: "10".into(),
                ..LotOrder::default()
            };
            ManufactureController::create_lot(tx, "SITE", order).unwrap();
            ManufactureController::put_lot_from_production_to_using(
                tx,
                "SITE",
                lot,
                Environment::default(),
            )
            .unwrap();
        }
    }

    #[test]
    fn refused_lot_order_consumes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("site.db")).unwrap();
        let ledger = SledLedger::new(Arc::new(db));
        let authority = Authority::permissive("Org1MSP");
        let alice = CallContext::new("alice", "Org1MSP");
        let mut raw = ledger.begin(b"alice");
        let mut tx = TxContext::new(&mut raw, &authority, &alice);
        site_with_raw_lots(&mut tx, &["RAW"]);

        let empty = LotOrder {
            key: "BREAD".into(),
            product_id: "P1".into(),
            units: "0".into(),
            components: strings(&["RAW:10"]),
            ..LotOrder::default()
        };
        let err = ManufactureController::create_lot(&mut tx, "SITE", empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(LotController::get(&tx, "RAW").unwrap().state, LotState::Using);
        assert!(!LotController::exists(&tx, "BREAD").unwrap());
        assert_eq!(ManufactureController::using_lots(&tx, "SITE").unwrap(), vec!["RAW"]);

        let enforced = Authority::new(
            Box::new(HexCertIdentity::new("Org1MSP")),
            AccessPolicy {
                enforce_org_match: false,
                enforce_roles: true,
            },
        );
        let mut tx = TxContext::new(&mut raw, &enforced, &alice);
        let order = LotOrder {
            key: "BREAD".into(),
            product_id: "P1".into(),
            units: "10".into(),
            components: strings(&["RAW:10"]),
            ..LotOrder::default()
        };
        let err = ManufactureController::create_lot(&mut tx, "SITE", order).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(LotController::get(&tx, "RAW").unwrap().state, LotState::Using);
    }

    #[test]
    fn refused_split_for_use_splits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("site.db")).unwrap();
        let ledger = SledLedger::new(Arc::new(db));
        let authority = Authority::permissive("Org1MSP");
        let alice = CallContext::new("alice", "Org1MSP");
        let mut raw = ledger.begin(b"alice");
        let mut tx = TxContext::new(&mut raw, &authority, &alice);
        site_with_raw_lots(&mut tx, &["A", "B"]);

        let away = Relocation {
            location_id: "SITE".into(),
            new_advisor: "alice".into(),
            ..Relocation::default()
        };
        LotController::transport(&mut tx, "B", &away).unwrap();

        let err = ManufactureController::fractionate_for_use(
            &mut tx,
            "SITE",
            &strings(&["A:4", "B:4"]),
            &strings(&["A1", "A2", "B1", "B2"]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let a = LotController::get(&tx, "A").unwrap();
        assert_eq!(a.state, LotState::Using);
        assert_eq!(a.units, "10");
        assert!(!LotController::exists(&tx, "A1").unwrap());
        assert_eq!(ManufactureController::using_lots(&tx, "SITE").unwrap(), vec!["A", "B"]);

        let err = ManufactureController::fractionate_for_use(
            &mut tx,
            "SITE",
            &strings(&["A:0"]),
            &strings(&["A1", "A2"]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!LotController::exists(&tx, "A1").unwrap());
    }

    #[test]
    fn repair_list_moves() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("site.db")).unwrap();
        let ledger = SledLedger::new(Arc::new(db));
        let authority = Authority::permissive("Org1MSP");
        let alice = CallContext::new("alice", "Org1MSP");
        let mut raw = ledger.begin(b"alice");
        let mut tx = TxContext::new(&mut raw, &authority, &alice);
        site_with_raw_lots(&mut tx, &[]);
        for lot in ["A", "B"] {
            let new = NewLot {
                key: lot.into(),
                units: "5".into(),
                current_location_id: "SITE".into(),
                ..NewLot::default()
            };
            LotController::create(&mut tx, new).unwrap();
        }

        let here = Relocation {
            location_id: "SITE".into(),
            new_advisor: "alice".into(),
            ..Relocation::default()
        };
        // a lot has to be Repairing before the site takes it in
        let err = ManufactureController::put_lot_in_reparing(&mut tx, "SITE", "A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        for lot in ["A", "B"] {
            LotController::transport(&mut tx, lot, &here).unwrap();
            LotController::store(&mut tx, lot, &here).unwrap();
            LotController::return_lot(&mut tx, lot, &here, "Org1MSP").unwrap();
            LotController::put_on_reparation(&mut tx, lot, &here, "Org1MSP").unwrap();
            ManufactureController::put_lot_in_reparing(&mut tx, "SITE", lot).unwrap();
        }
        let err = ManufactureController::put_lot_in_reparing(&mut tx, "SITE", "A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ManufactureController::repairing_lots(&tx, "SITE").unwrap(), vec!["A", "B"]);

        let inspected = ManufactureController::inspection_lot(
            &mut tx,
            "SITE",
            "A",
            Certification {
                issuer: "lab".into(),
                certification_type: "damage".into(),
                result: "repairable".into(),
            },
        )
        .unwrap();
        assert_eq!(inspected.certifications.len(), 1);
        let err = ManufactureController::inspection_lot(&mut tx, "SITE", "GHOST", Certification::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let repaired = ManufactureController::repair_lot(&mut tx, "SITE", "A", &here).unwrap();
        assert_eq!(repaired.state, LotState::Transporting);
        assert_eq!(repaired.product_state, crate::lot::ProductCondition::Normal);

        let err = ManufactureController::destroy_lot(&mut tx, "SITE", "A").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let scrapped = ManufactureController::destroy_lot(&mut tx, "SITE", "B").unwrap();
        assert_eq!(scrapped.state, LotState::Destroyed);
        assert!(ManufactureController::repairing_lots(&tx, "SITE").unwrap().is_empty());
    }

    #[test]
    fn lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("site.db")).unwrap();
        let ledger = SledLedger::new(Arc::new(db));
        let authority = Authority::permissive("Org1MSP");
        let alice = CallContext::new("alice", "Org1MSP");
        let mut raw = ledger.begin(b"alice");
        let mut tx = TxContext::new(&mut raw, &authority, &alice);

        ManufactureController::create(&mut tx, "SITE", Location::default()).unwrap();
        let err = ManufactureController::destroy(&mut tx, "SITE").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        ManufactureController::broken(&mut tx, "SITE").unwrap();
        let err = ManufactureController::update_advisor(&mut tx, "SITE", "bob").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        ManufactureController::inspection(&mut tx, "SITE", Certification::default()).unwrap();

        ManufactureController::ready_to_produce(&mut tx, "SITE").unwrap();
        ManufactureController::broken(&mut tx, "SITE").unwrap();
        ManufactureController::destroy(&mut tx, "SITE").unwrap();
        assert!(ManufactureController::list(&tx).unwrap().is_empty());

        let err = ManufactureController::inspection(&mut tx, "SITE", Certification::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
