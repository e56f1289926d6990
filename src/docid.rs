//! Document identifiers: `EESIPL/{YYYY}/{MM}/{CODE}/{NNN}`.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Datelike, Local, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DOC_PREFIX: &str = "EESIPL";

const SEQ_MAX: u32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocType {
    #[default]
    Quotation,
    #[serde(rename = "Tax Invoice")]
    TaxInvoice,
    #[serde(rename = "Proforma Invoice")]
    ProformaInvoice,
    #[serde(rename = "Purchase Order")]
    PurchaseOrder,
    #[serde(rename = "Delivery Challan")]
    DeliveryChallan,
}

impl DocType {
    pub const ALL: [DocType; 5] = [
        DocType::Quotation,
        DocType::TaxInvoice,
        DocType::ProformaInvoice,
        DocType::PurchaseOrder,
        DocType::DeliveryChallan,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DocType::Quotation => "Quotation",
            DocType::TaxInvoice => "Tax Invoice",
            DocType::ProformaInvoice => "Proforma Invoice",
            DocType::PurchaseOrder => "Purchase Order",
            DocType::DeliveryChallan => "Delivery Challan",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            DocType::Quotation => "QN",
            DocType::TaxInvoice => "TI",
            DocType::ProformaInvoice => "PI",
            DocType::PurchaseOrder => "PO",
            DocType::DeliveryChallan => "DC",
        }
    }

    /// Unknown labels fall back to Quotation.
    pub fn from_label(label: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.label() == label)
            .unwrap_or_default()
    }
}

/// Source of the trailing `NNN` segment. Values are in `1..=999`.
pub trait SequenceSource: Send + Sync {
    fn next(&self) -> u32;
}

/// Uniform random draw. Two calls may return the same number.
#[derive(Debug, Default)]
pub struct RandomSequence;

impl SequenceSource for RandomSequence {
    fn next(&self) -> u32 {
        rand::thread_rng().gen_range(1..=SEQ_MAX)
    }
}

/// In-process counter, wrapping from 999 back to 1. Unique only within
/// one process and one 999-id window.
#[derive(Debug)]
pub struct CounterSequence {
    last: AtomicU32,
}

impl CounterSequence {
    pub fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last % SEQ_MAX),
        }
    }
}

impl Default for CounterSequence {
    fn default() -> Self {
        Self::starting_after(0)
    }
}

impl SequenceSource for CounterSequence {
    fn next(&self) -> u32 {
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n % SEQ_MAX + 1))
            .unwrap_or(0);
        prev % SEQ_MAX + 1
    }
}

/// Pure formatter behind [`DocIdGenerator::generate`].
pub fn format_doc_id(doc_type: DocType, date: NaiveDate, seq: u32) -> String {
    format!(
        "{}/{:04}/{:02}/{}/{:03}",
        DOC_PREFIX,
        date.year(),
        date.month(),
        doc_type.code(),
        seq.clamp(1, SEQ_MAX)
    )
}

pub struct DocIdGenerator {
    sequence: Box<dyn SequenceSource>,
}

impl DocIdGenerator {
    pub fn new(sequence: Box<dyn SequenceSource>) -> Self {
        Self { sequence }
    }

    /// Pick the sequence source by name: `counter`, anything else is random.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "counter" => Self::new(Box::new(CounterSequence::default())),
            _ => Self::new(Box::new(RandomSequence)),
        }
    }

    pub fn generate(&self, doc_type: &str) -> String {
        self.generate_for(DocType::from_label(doc_type), Local::now().date_naive())
    }

    pub fn generate_for(&self, doc_type: DocType, date: NaiveDate) -> String {
        format_doc_id(doc_type, date, self.sequence.next())
    }
}

impl Default for DocIdGenerator {
    fn default() -> Self {
        Self::new(Box::new(RandomSequence))
    }
}
