//! Submit/evaluate classification of contract entry points.
//!
//! Each contract declares its operations once through [`operations!`]; the
//! read-only list and the commit decision are both derived from that table.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Mutates the ledger; its transaction is committed.
    Submit,
    /// Read-only; its transaction is always discarded.
    Evaluate,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Submit => "submit",
            OperationKind::Evaluate => "evaluate",
        }
    }
}

pub trait Operation: Copy + std::fmt::Debug + 'static {
    const ALL: &'static [Self];

    fn contract(self) -> &'static str;
    fn name(self) -> &'static str;
    fn kind(self) -> OperationKind;

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

pub trait Contract {
    type Operation: Operation;

    /// Names of the read-only entry points.
    fn evaluate_transactions() -> Vec<&'static str> {
        Self::Operation::ALL
            .iter()
            .filter(|op| op.kind() == OperationKind::Evaluate)
            .map(|op| op.name())
            .collect()
    }
}

/// Declares an operation enum with a name and a kind per variant.
///
/// ```ignore
/// operations! {
///     pub enum ShelfOperation for "shelf" {
///         Stock => "StockShelf": Submit,
///         Count => "CountShelf": Evaluate,
///     }
/// }
/// ```
macro_rules! operations {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident for $contract:literal {
            $($variant:ident => $op:literal : $kind:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::operation::Operation for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn contract(self) -> &'static str {
                $contract
            }

            fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $op),+
                }
            }

            fn kind(self) -> $crate::operation::OperationKind {
                match self {
                    $($name::$variant => $crate::operation::OperationKind::$kind),+
                }
            }
        }
    };
}

pub(crate) use operations;
