//! Logical field roles and their resolution to the concrete column names of a loaded table.
//!
//! Column names differ between exports of the same data. Each logical field carries an
//! ordered list of candidate names; the first candidate present in the table wins. New
//! synonyms are data (the `[columns]` config section), not code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{MissingField, SessionError};

/// Logical role of a column, independent of how a particular file names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    TransactionId,
    OrderId,
    Date,
    Category,
    Product,
    Revenue,
    Refund,
    ReturnFlag,
    Channel,
    Device,
    SupportTicket,
}

/// How the snapshot loader coerces a field's column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Opaque identifier, kept as read
    Identifier,
    /// Parsed to a datetime; unparseable cells become null
    Timestamp,
    /// Text label used for grouping and filtering
    Dimension,
    /// Non-negative amount; unparseable cells become 0.0
    Amount,
    /// Boolean-like 0/1 indicator
    Flag,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::TransactionId,
        Field::OrderId,
        Field::Date,
        Field::Category,
        Field::Product,
        Field::Revenue,
        Field::Refund,
        Field::ReturnFlag,
        Field::Channel,
        Field::Device,
        Field::SupportTicket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::TransactionId => "transaction_id",
            Field::OrderId => "order_id",
            Field::Date => "date",
            Field::Category => "category",
            Field::Product => "product",
            Field::Revenue => "revenue",
            Field::Refund => "refund",
            Field::ReturnFlag => "return_flag",
            Field::Channel => "channel",
            Field::Device => "device",
            Field::SupportTicket => "support_ticket",
        }
    }

    /// Parse the snake_case name used in config files.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::TransactionId | Field::OrderId => FieldKind::Identifier,
            Field::Date => FieldKind::Timestamp,
            Field::Category | Field::Product | Field::Channel | Field::Device => {
                FieldKind::Dimension
            }
            Field::Revenue | Field::Refund => FieldKind::Amount,
            Field::ReturnFlag | Field::SupportTicket => FieldKind::Flag,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built-in synonyms, highest priority first. The first entry of each list is the name
/// used by the richest export format.
const DEFAULT_CANDIDATES: &[(Field, &[&str])] = &[
    (
        Field::TransactionId,
        &[
            "Transaction_ID",
            "transaction_id",
            "TransactionID",
            "Transaction ID",
            "txn_id",
        ],
    ),
    (
        Field::OrderId,
        &["Order_ID", "order_id", "OrderID", "Order ID"],
    ),
    (
        Field::Date,
        &[
            "Date",
            "date",
            "Order_Date",
            "order_date",
            "Timestamp",
            "timestamp",
            "Created_At",
            "created_at",
        ],
    ),
    (
        Field::Category,
        &[
            "Product_Category",
            "product_category",
            "Category",
            "category",
        ],
    ),
    (
        Field::Product,
        &["Product_Name", "product_name", "Product", "product"],
    ),
    (
        Field::Revenue,
        &[
            "Revenue_EUR",
            "revenue_eur",
            "Revenue",
            "revenue",
            "Sales",
            "Amount",
        ],
    ),
    (
        Field::Refund,
        &[
            "Refund_Amount",
            "refund_amount",
            "Refund_EUR",
            "Refund",
            "refund",
        ],
    ),
    (
        Field::ReturnFlag,
        &[
            "Has_Return",
            "has_return",
            "Returned",
            "returned",
            "Is_Returned",
            "is_returned",
        ],
    ),
    (
        Field::Channel,
        &["Channel", "channel", "Sales_Channel", "sales_channel"],
    ),
    (
        Field::Device,
        &["Device", "device", "Device_Type", "device_type"],
    ),
    (
        Field::SupportTicket,
        &[
            "Support_Ticket",
            "support_ticket",
            "Has_Support_Ticket",
            "has_support_ticket",
            "Ticket_Opened",
        ],
    ),
];

/// Ordered candidate column names for each logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTable {
    entries: BTreeMap<Field, Vec<String>>,
}

impl Default for CandidateTable {
    fn default() -> Self {
        let entries = DEFAULT_CANDIDATES
            .iter()
            .map(|(field, names)| (*field, names.iter().map(|s| s.to_string()).collect()))
            .collect();
        Self { entries }
    }
}

impl CandidateTable {
    /// A table with no candidates at all (every field resolves as absent until synonyms are added).
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn candidates(&self, field: Field) -> &[String] {
        self.entries.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Put `names` ahead of the existing candidates for `field`. Duplicates keep their new,
    /// higher priority.
    pub fn with_synonyms<I, S>(mut self, field: Field, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged: Vec<String> = names.into_iter().map(Into::into).collect();
        let existing = self.entries.remove(&field).unwrap_or_default();
        for name in existing {
            if !merged.contains(&name) {
                merged.push(name);
            }
        }
        merged.dedup();
        self.entries.insert(field, merged);
        self
    }

    /// Map every field to the first candidate present in `columns`, or mark it absent.
    pub fn resolve<S: AsRef<str>>(&self, columns: &[S]) -> SchemaMapping {
        let mut resolved = BTreeMap::new();
        for (field, candidates) in &self.entries {
            let hit = candidates
                .iter()
                .find(|c| columns.iter().any(|col| col.as_ref() == c.as_str()));
            if let Some(name) = hit {
                resolved.insert(*field, name.clone());
            }
        }
        SchemaMapping { columns: resolved }
    }
}

/// Result of resolution: field → concrete column name. Fields without an entry are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaMapping {
    columns: BTreeMap<Field, String>,
}

impl SchemaMapping {
    pub fn column(&self, field: Field) -> Option<&str> {
        self.columns.get(&field).map(String::as_str)
    }

    pub fn is_resolved(&self, field: Field) -> bool {
        self.columns.contains_key(&field)
    }

    pub fn resolved(&self) -> impl Iterator<Item = (Field, &str)> {
        self.columns.iter().map(|(f, c)| (*f, c.as_str()))
    }

    /// Fields of `fields` that did not resolve, in the order given.
    pub fn missing(&self, fields: &[Field]) -> Vec<Field> {
        fields
            .iter()
            .copied()
            .filter(|f| !self.is_resolved(*f))
            .collect()
    }
}

/// Which schema variant a file is expected to follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaProfile {
    /// All seven columns of the full export must be present
    #[default]
    Full,
    /// Nothing is required; dependent metrics degrade to "unavailable"
    Lenient,
}

/// The set of fields whose absence is fatal for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPolicy {
    required: Vec<Field>,
}

impl SchemaPolicy {
    pub fn full() -> Self {
        Self {
            required: vec![
                Field::TransactionId,
                Field::Date,
                Field::Category,
                Field::Product,
                Field::Revenue,
                Field::Refund,
                Field::ReturnFlag,
            ],
        }
    }

    pub fn lenient() -> Self {
        Self {
            required: Vec::new(),
        }
    }

    pub fn from_profile(profile: SchemaProfile) -> Self {
        match profile {
            SchemaProfile::Full => Self::full(),
            SchemaProfile::Lenient => Self::lenient(),
        }
    }

    pub fn required(&self) -> &[Field] {
        &self.required
    }

    /// Fails with every missing required field listed at once.
    pub fn check(
        &self,
        mapping: &SchemaMapping,
        candidates: &CandidateTable,
    ) -> Result<(), SessionError> {
        let missing: Vec<MissingField> = mapping
            .missing(&self.required)
            .into_iter()
            .map(|field| MissingField {
                field,
                candidates: candidates.candidates(field).to_vec(),
            })
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SessionError::MissingFields(missing))
        }
    }
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self::full()
    }
}
