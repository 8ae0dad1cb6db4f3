//! Product catalogue entries and their production lifecycle.
use std::fmt;

use tracing::debug;

use crate::context::TxContext;
use crate::error::{LedgerError, Result};
use crate::history::HistoryRecord;
use crate::operation::{Contract, operations};
use crate::record::Record;
use crate::types::{Brand, Certification, Dimension, NetContent};

pub const PRODUCT_INDEX: &str = "product";
const ENTITY: &str = "product";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
#[cbor(index_only)]
pub enum ProductState {
    #[n(0)]
    Testing,
    #[n(1)]
    Production,
    #[n(2)]
    Discontinued,
    #[n(3)]
    Destroyed,
}

impl ProductState {
    pub fn name(self) -> &'static str {
        match self {
            ProductState::Testing => "Testing",
            ProductState::Production => "Production",
            ProductState::Discontinued => "Discontinued",
            ProductState::Destroyed => "Destroyed",
        }
    }
}

impl fmt::Display for ProductState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct Product {
    #[n(0)]
    pub doc_type: String,
    #[n(1)]
    pub product_id: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub brand: Brand,
    #[n(5)]
    pub core: String,
    #[n(6)]
    pub variety: String,
    #[n(7)]
    pub image: String,
    #[n(8)]
    pub net_content: NetContent,
    #[n(9)]
    pub pack_dimension: Dimension,
    #[n(10)]
    pub display_space: Dimension,
    #[n(11)]
    pub package_type: String,
    #[n(12)]
    pub certifications: Vec<Certification>,
    /// Site that designs and produces the product.
    #[n(13)]
    pub manufacturer: String,
    #[n(14)]
    pub manufacture_details: String,
    #[n(15)]
    pub state: ProductState,
    #[n(16)]
    pub components: Vec<String>,
    #[n(17)]
    pub advisor: String,
}

impl Record for Product {
    const DOC_TYPE: &'static str = "product";

    fn doc_type(&self) -> &str {
        &self.doc_type
    }
}

impl Product {
    fn index_attributes(&self) -> [&str; 3] {
        [
            self.product_id.as_str(),
            self.name.as_str(),
            self.variety.as_str(),
        ]
    }
}

/// Descriptive fields supplied when a product is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductSpec {
    pub key: String,
    pub name: String,
    pub description: String,
    pub brand: Brand,
    pub core: String,
    pub variety: String,
    pub image: String,
    pub net_content: NetContent,
    pub pack_dimension: Dimension,
    pub display_space: Dimension,
    pub package_type: String,
    pub manufacture_details: String,
    /// Products this one is assembled from.
    pub components: Vec<String>,
}

operations! {
    pub enum ProductOperation for "product" {
        Create => "CreateProduct": Submit,
        Exists => "ExistsProduct": Evaluate,
        Get => "GetProduct": Evaluate,
        GetAdvisor => "GetProductAdvisor": Evaluate,
        Certify => "CertifyProduct": Submit,
        StartProduction => "StartProduction": Submit,
        Discontinue => "DiscontinueProduct": Submit,
        ContinueProduction => "ContinueProduction": Submit,
        Destroy => "ProductDestroyed": Submit,
        GetHistory => "GetProductHistory": Evaluate,
        List => "ListProducts": Evaluate,
    }
}

pub struct ProductController;

impl Contract for ProductController {
    type Operation = ProductOperation;
}

impl ProductController {
    /// Loads `key`, checks the caller advises it and that it is in `expected`.
    fn load_for(tx: &TxContext<'_>, key: &str, expected: ProductState) -> Result<Product> {
        let product: Product = tx.load(key)?;
        tx.require_advisor(ENTITY, key, &product.advisor)?;
        if product.state != expected {
            return Err(LedgerError::invalid_state(
                ENTITY,
                key,
                expected.name(),
                product.state,
            ));
        }
        Ok(product)
    }

    fn advance(tx: &mut TxContext<'_>, key: &str, from: ProductState, to: ProductState) -> Result<Product> {
        let mut product = Self::load_for(tx, key, from)?;
        product.state = to;
        tx.store(key, &product)?;
        debug!(product = key, from = %from, to = %to, "product state changed");
        Ok(product)
    }

    pub fn create(tx: &mut TxContext<'_>, spec: ProductSpec, manufacturer: &str) -> Result<Product> {
        tx.require_role("abac.manufacturer_administrator")?;
        tx.require_absent(ENTITY, &spec.key)?;
        if spec.name.trim().is_empty() {
            return Err(LedgerError::Validation(format!(
                "product {} needs a name",
                spec.key
            )));
        }
        let advisor = tx.principal()?;

        let product = Product {
            doc_type: Product::DOC_TYPE.to_string(),
            product_id: spec.key,
            name: spec.name,
            description: spec.description,
            brand: spec.brand,
            core: spec.core,
            variety: spec.variety,
            image: spec.image,
            net_content: spec.net_content,
            pack_dimension: spec.pack_dimension,
            display_space: spec.display_space,
            package_type: spec.package_type,
            certifications: Vec::new(),
            manufacturer: manufacturer.to_string(),
            manufacture_details: spec.manufacture_details,
            state: ProductState::Testing,
            components: spec.components,
            advisor,
        };

        tx.store(&product.product_id, &product)?;
        tx.put_index(PRODUCT_INDEX, &product.index_attributes())?;
        debug!(product = %product.product_id, manufacturer, "product created");
        Ok(product)
    }

    pub fn exists(tx: &TxContext<'_>, key: &str) -> Result<bool> {
        tx.exists(key)
    }

    pub fn get(tx: &TxContext<'_>, key: &str) -> Result<Product> {
        tx.load(key)
    }

    pub fn get_advisor(tx: &TxContext<'_>, key: &str) -> Result<String> {
        Ok(Self::get(tx, key)?.advisor)
    }

    pub fn certify(tx: &mut TxContext<'_>, key: &str, certification: Certification) -> Result<Product> {
        let mut product = Self::load_for(tx, key, ProductState::Testing)?;
        product.certifications.push(certification);
        tx.store(key, &product)?;
        Ok(product)
    }

    pub fn start_production(tx: &mut TxContext<'_>, key: &str) -> Result<Product> {
        Self::advance(tx, key, ProductState::Testing, ProductState::Production)
    }

    pub fn discontinue(tx: &mut TxContext<'_>, key: &str) -> Result<Product> {
        Self::advance(tx, key, ProductState::Production, ProductState::Discontinued)
    }

    pub fn continue_production(tx: &mut TxContext<'_>, key: &str) -> Result<Product> {
        Self::advance(tx, key, ProductState::Discontinued, ProductState::Production)
    }

    pub fn destroy(tx: &mut TxContext<'_>, key: &str) -> Result<Product> {
        let product = Self::advance(tx, key, ProductState::Discontinued, ProductState::Destroyed)?;
        tx.del_index(PRODUCT_INDEX, &product.index_attributes())?;
        Ok(product)
    }

    pub fn get_history(tx: &TxContext<'_>, key: &str) -> Result<Vec<HistoryRecord<Product>>> {
        tx.history(key)
    }

    pub fn list(tx: &TxContext<'_>) -> Result<Vec<String>> {
        tx.index_keys(PRODUCT_INDEX)
    }
}
