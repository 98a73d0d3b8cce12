//! Scenario replay
//!
//! A scenario is a JSON document with an optional service configuration and a
//! list of timed steps. Replay runs the steps against a fresh service driven by
//! a manual clock and a recording payout sink, then reports every step outcome,
//! the journaled events and the final escrow state.
//!
//! ```json
//! {
//!   "name": "late return",
//!   "steps": [
//!     { "action": "list", "caller": "owner", "title": "Dune", "daily_price": 10, "deposit": 50 },
//!     { "action": "rent", "caller": "alice", "book_id": 0, "payment": 60 },
//!     { "advance_secs": 130, "action": "return", "caller": "alice", "book_id": 0 },
//!     { "action": "withdraw", "caller": "bob", "expect_error": "state" }
//!   ]
//! }
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use rental_core::{
    Clock, ErrorKind, EscrowSnapshot, ManualClock, MemoryStore, RecordingSink, RentalConfig,
    RentalError, RentalService, RentalStore,
};
use rental_types::{amount_serde, Amount, BookId, BookView, EventEnvelope, Identity};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the configuration given on the command line.
    #[serde(default)]
    pub config: Option<RentalConfig>,
    #[serde(default = "default_start")]
    pub start: DateTime<Utc>,
    pub steps: Vec<Step>,
}

fn default_start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

impl Scenario {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("invalid scenario document")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("in {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Seconds the clock moves forward before the action runs.
    #[serde(default)]
    pub advance_secs: u64,
    #[serde(flatten)]
    pub action: Action,
    /// The step is expected to fail with this kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    List {
        caller: Identity,
        title: String,
        #[serde(with = "amount_serde")]
        daily_price: Amount,
        #[serde(with = "amount_serde")]
        deposit: Amount,
    },
    Unlist {
        caller: Identity,
        book_id: BookId,
    },
    Rent {
        caller: Identity,
        book_id: BookId,
        #[serde(with = "amount_serde")]
        payment: Amount,
    },
    Return {
        caller: Identity,
        book_id: BookId,
    },
    Withdraw {
        caller: Identity,
    },
    Quote {
        book_id: BookId,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Unlist { .. } => "unlist",
            Self::Rent { .. } => "rent",
            Self::Return { .. } => "return",
            Self::Withdraw { .. } => "withdraw",
            Self::Quote { .. } => "quote",
        }
    }

    fn caller(&self) -> Option<&Identity> {
        match self {
            Self::List { caller, .. }
            | Self::Unlist { caller, .. }
            | Self::Rent { caller, .. }
            | Self::Return { caller, .. }
            | Self::Withdraw { caller } => Some(caller),
            Self::Quote { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub action: &'static str,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
    pub as_expected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: Option<String>,
    pub outcomes: Vec<StepOutcome>,
    pub events: Vec<EventEnvelope>,
    pub books: Vec<BookView>,
    /// Pending balance of every identity the scenario touched.
    #[serde(serialize_with = "balances_as_strings")]
    pub balances: BTreeMap<Identity, Amount>,
    pub escrow: EscrowSnapshot,
    pub solvent: bool,
}

fn balances_as_strings<S: Serializer>(
    balances: &BTreeMap<Identity, Amount>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(balances.iter().map(|(identity, amount)| (identity, amount.to_string())))
}

impl ScenarioReport {
    /// Steps whose outcome differed from their expectation.
    pub fn unexpected(&self) -> Vec<&StepOutcome> {
        self.outcomes.iter().filter(|o| !o.as_expected).collect()
    }
}

/// Replay `scenario` against a fresh in-memory service.
pub async fn run_scenario(
    scenario: Scenario,
    fallback: RentalConfig,
) -> anyhow::Result<ScenarioReport> {
    let config = scenario.config.clone().unwrap_or(fallback);
    let clock = Arc::new(ManualClock::new(scenario.start));
    let store = Arc::new(MemoryStore::new());
    let service = RentalService::bootstrap(
        config,
        store.clone(),
        clock.clone(),
        Arc::new(RecordingSink::new()),
    )
    .await?;

    info!(
        scenario = scenario.name.as_deref().unwrap_or("unnamed"),
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let mut touched: Vec<Identity> = vec![service.owner().clone()];
    let mut outcomes = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.into_iter().enumerate() {
        let secs = i64::try_from(step.advance_secs)
            .with_context(|| format!("step {index}: advance_secs out of range"))?;
        clock.advance_secs(secs);

        if let Some(caller) = step.action.caller() {
            touched.push(caller.clone());
        }

        let result = execute(&service, &step.action).await;
        let as_expected = match (&result, step.expect_error) {
            (Ok(_), None) => true,
            (Err(err), Some(kind)) => err.kind() == kind,
            _ => false,
        };
        debug!(index, action = step.action.name(), ok = result.is_ok(), as_expected, "step replayed");

        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(err) => (
                None,
                Some(StepFailure {
                    kind: err.kind(),
                    message: err.to_string(),
                }),
            ),
        };
        outcomes.push(StepOutcome {
            index,
            action: step.action.name(),
            at: clock.now(),
            result,
            error,
            as_expected,
        });
    }

    let events = store.load().await?;
    let balances = touched
        .into_iter()
        .map(|identity| {
            let pending = service.pending_refund(&identity);
            (identity, pending)
        })
        .collect();

    Ok(ScenarioReport {
        name: scenario.name,
        outcomes,
        events,
        books: service.books_with_rentals(),
        balances,
        escrow: service.escrow_snapshot()?,
        solvent: service.verify_solvency()?,
    })
}

async fn execute(service: &RentalService, action: &Action) -> Result<Value, RentalError> {
    match action {
        Action::List {
            caller,
            title,
            daily_price,
            deposit,
        } => {
            let book_id = service
                .list_item(caller, title, *daily_price, *deposit)
                .await?;
            Ok(json!({ "book_id": book_id }))
        }
        Action::Unlist { caller, book_id } => {
            service.unlist_item(caller, *book_id).await?;
            Ok(json!({ "book_id": book_id }))
        }
        Action::Rent {
            caller,
            book_id,
            payment,
        } => {
            let rental = service.rent_item(caller, *book_id, *payment).await?;
            Ok(to_json(&rental))
        }
        Action::Return { caller, book_id } => {
            let settlement = service.return_item(caller, *book_id).await?;
            Ok(to_json(&settlement))
        }
        Action::Withdraw { caller } => {
            let amount = service.withdraw_refund(caller).await?;
            Ok(json!({ "amount": amount.to_string() }))
        }
        Action::Quote { book_id } => Ok(to_json(&service.quote_return(*book_id)?)),
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
