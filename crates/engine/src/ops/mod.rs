use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{InterestRate, LogNotifier, MaturityTerm, Notification, Notifier, ResultEngine};

mod access;
mod integrity;
mod ledger;
mod loans;
mod maturity;

pub use ledger::{Eligibility, PassbookFilter, PassbookPage};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    rate: InterestRate,
    term: MaturityTerm,
    notifier: Arc<dyn Notifier>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The interest rate maturity figures are derived with.
    pub fn interest_rate(&self) -> InterestRate {
        self.rate
    }

    pub fn maturity_term(&self) -> MaturityTerm {
        self.term
    }

    /// Hands a notification to the notifier. Failures are logged, never returned.
    fn dispatch(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(&notification) {
            tracing::warn!(
                member_id = %notification.member_id,
                kind = notification.kind.as_str(),
                "{err}"
            );
        }
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    rate: InterestRate,
    term: MaturityTerm,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Canonical interest rate. Defaults to 12 % per annum.
    pub fn interest_rate(mut self, rate: InterestRate) -> EngineBuilder {
        self.rate = rate;
        self
    }

    /// Length of a maturity cycle. Defaults to 36 months.
    pub fn maturity_term(mut self, term: MaturityTerm) -> EngineBuilder {
        self.term = term;
        self
    }

    /// Notification channel. Defaults to [`LogNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> EngineBuilder {
        self.notifier = Some(notifier);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            rate: self.rate,
            term: self.term,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
        })
    }
}
