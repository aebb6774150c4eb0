//! Ledger and maturity engine for a cooperative savings/loan society.
//!
//! - the **passbook** is an append-only ledger of member deposits, loan
//!   installments, disbursements and informational markers;
//! - **loans** move through `pending → active → closed` (or `rejected`) and
//!   their outstanding balance is always derived from the passbook;
//! - **maturity records** accrue interest on member deposits and can be
//!   manually overridden before they are claimed.
//!
//! Everything goes through [`Engine`], which owns the database connection.

pub use error::{EngineError, ErrorKind};
pub use integrity::{IntegrityReport, IntegrityWarning};
pub use loans::{ApprovalTerms, InstallmentReceipt, Loan, LoanBalance, LoanStatus};
pub use maturity::{
    GenerationSummary, MaturityRecord, MaturityStatus, MaturityTerm, MaturityView,
};
pub use members::{Member, MemberStatus};
pub use money::Money;
pub use notify::{LogNotifier, Notification, NotificationKind, Notifier, NotifyError};
pub use ops::{Eligibility, Engine, EngineBuilder, PassbookFilter, PassbookPage};
pub use passbook::{EntryId, EntryMode, NewEntry, PassbookEntry};
pub use rate::{InterestRate, eligibility_cap};

mod error;
mod integrity;
mod loans;
mod maturity;
mod members;
mod money;
mod notify;
mod ops;
mod passbook;
mod rate;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
