use std::error::Error;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{
    ApprovalTerms, Engine, InterestRate, MaturityStatus, MaturityTerm, Money, NewEntry,
    PassbookFilter,
};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use uuid::Uuid;

mod settings;

/// Member bootstrap. Enrollment is not an engine operation, so the CLI owns
/// this table view.
mod members {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
    #[sea_orm(table_name = "members")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub name: String,
        pub status: String,
        pub enrolled_at: DateTimeUtc,
        pub user_id: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

#[derive(Parser, Debug)]
#[command(name = "coop_admin")]
#[command(about = "Operator utilities for the society ledger")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    /// Falls back to `database.url` from the settings.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Member(MemberCmd),
    /// Post a deposit to a member's passbook.
    Deposit(DepositArgs),
    /// Total deposits and the 80 % loan cap.
    Eligibility(MemberArg),
    /// Print a member's passbook, oldest first.
    Passbook(PassbookArgs),
    Loan(LoanCmd),
    Maturity(MaturityCmd),
    /// Scan the store for inconsistent state.
    Integrity,
}

#[derive(Args, Debug)]
struct MemberArg {
    #[arg(long)]
    member: Uuid,
}

#[derive(Args, Debug)]
struct PassbookArgs {
    #[arg(long)]
    member: Uuid,
    /// Inclusive lower bound on the transaction date.
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the transaction date.
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    /// Resume after this entry id (`next_after` of the previous page).
    #[arg(long)]
    after: Option<i64>,
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args, Debug)]
struct MemberCmd {
    #[command(subcommand)]
    command: MemberCommand,
}

#[derive(Subcommand, Debug)]
enum MemberCommand {
    Create(MemberCreateArgs),
    Show(MemberArg),
}

#[derive(Args, Debug)]
struct MemberCreateArgs {
    #[arg(long)]
    name: String,
    /// Login identity linked to the member.
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    enrolled_at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
struct DepositArgs {
    #[arg(long)]
    member: Uuid,
    #[arg(long)]
    amount: Money,
    #[arg(long)]
    fine: Option<Money>,
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct LoanCmd {
    #[command(subcommand)]
    command: LoanCommand,
}

#[derive(Args, Debug)]
struct LoanArg {
    #[arg(long)]
    id: Uuid,
}

#[derive(Subcommand, Debug)]
enum LoanCommand {
    Request(LoanRequestArgs),
    Approve(LoanApproveArgs),
    Reject(LoanArg),
    /// Post an installment towards an active loan.
    Pay(LoanPayArgs),
    Close(LoanArg),
    Show(LoanArg),
    /// Outstanding balance of the member's active loan.
    Balance(MemberArg),
    List(MemberArg),
    Pending,
}

#[derive(Args, Debug)]
struct LoanRequestArgs {
    #[arg(long)]
    member: Uuid,
    #[arg(long)]
    amount: Money,
    #[arg(long, default_value_t = 1200)]
    rate_bps: i64,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct LoanApproveArgs {
    #[arg(long)]
    id: Uuid,
    /// Approve even above 80 % of the member's deposits.
    #[arg(long)]
    override_cap: bool,
    #[arg(long, requires = "emi")]
    installments: Option<i32>,
    /// Monthly installment amount.
    #[arg(long, requires = "installments")]
    emi: Option<Money>,
}

#[derive(Args, Debug)]
struct LoanPayArgs {
    #[arg(long)]
    id: Uuid,
    #[arg(long)]
    amount: Money,
    #[arg(long)]
    interest: Option<Money>,
    #[arg(long)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
struct MaturityCmd {
    #[command(subcommand)]
    command: MaturityCommand,
}

#[derive(Args, Debug)]
struct RecordArg {
    #[arg(long)]
    id: Uuid,
}

#[derive(Subcommand, Debug)]
enum MaturityCommand {
    /// Create or refresh the current cycle of every active member.
    Generate {
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
    /// Set a manual interest override, or clear it with `--clear`.
    Adjust {
        #[arg(long)]
        id: Uuid,
        #[arg(long, conflicts_with = "clear")]
        interest: Option<Money>,
        #[arg(long)]
        clear: bool,
    },
    Claim(RecordArg),
    Show(RecordArg),
    /// Current record of a member.
    Member(MemberArg),
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<MaturityStatus>,
    },
}

fn parse_status(raw: &str) -> Result<MaturityStatus, String> {
    MaturityStatus::try_from(raw.to_ascii_lowercase().as_str()).map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "coop_admin={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let database_url = cli.database_url.unwrap_or(settings.database.url);
    let db = connect_db(&database_url).await?;
    let engine = Engine::builder()
        .database(db.clone())
        .interest_rate(InterestRate::from_annual_bps(
            settings.interest.annual_rate_bps,
        )?)
        .maturity_term(MaturityTerm::from_months(settings.maturity.term_months)?)
        .build()
        .await?;

    let now = Utc::now();
    match cli.command {
        Command::Member(MemberCmd {
            command: MemberCommand::Create(args),
        }) => {
            if let Some(user_id) = &args.user_id
                && engine.member_for_user(user_id).await.is_ok()
            {
                eprintln!("user already linked to a member: {user_id}");
                std::process::exit(1);
            }

            let id = Uuid::new_v4();
            let member = members::ActiveModel {
                id: Set(id.to_string()),
                name: Set(args.name.trim().to_string()),
                status: Set("active".to_string()),
                enrolled_at: Set(args.enrolled_at.unwrap_or(now)),
                user_id: Set(args.user_id),
            };
            members::Entity::insert(member).exec(&db).await?;
            tracing::info!(member_id = %id, "member enrolled");
            print_json(&engine.member(id).await?)?;
        }
        Command::Member(MemberCmd {
            command: MemberCommand::Show(args),
        }) => print_json(&engine.member(args.member).await?)?,
        Command::Deposit(args) => {
            let entry = NewEntry::deposit(args.member, args.amount.minor(), args.date.unwrap_or(now))
                .with_fine(args.fine.map_or(0, Money::minor))
                .with_description(args.description);
            let entry_id = engine.append_entry(entry).await?;
            println!("posted entry {entry_id}");
        }
        Command::Eligibility(args) => print_json(&engine.eligibility(args.member).await?)?,
        Command::Passbook(args) => {
            let filter = PassbookFilter {
                from: args.from,
                to: args.to,
                after: args.after,
                limit: args.limit,
            };
            print_json(&engine.passbook_page(args.member, &filter).await?)?
        }
        Command::Loan(LoanCmd { command }) => match command {
            LoanCommand::Request(args) => print_json(
                &engine
                    .request_loan(
                        args.member,
                        args.amount.minor(),
                        args.rate_bps,
                        args.description.as_deref(),
                        now,
                    )
                    .await?,
            )?,
            LoanCommand::Approve(args) => {
                let mut terms = if args.override_cap {
                    ApprovalTerms::overriding_cap()
                } else {
                    ApprovalTerms::within_cap()
                };
                if let (Some(count), Some(emi)) = (args.installments, args.emi) {
                    terms = terms.with_schedule(count, emi.minor());
                }
                print_json(&engine.approve_loan(args.id, terms, now).await?)?
            }
            LoanCommand::Reject(args) => print_json(&engine.reject_loan(args.id, now).await?)?,
            LoanCommand::Pay(args) => print_json(
                &engine
                    .record_installment(
                        args.id,
                        args.amount.minor(),
                        args.interest.map_or(0, Money::minor),
                        args.date.unwrap_or(now),
                        args.description.as_deref(),
                    )
                    .await?,
            )?,
            LoanCommand::Close(args) => print_json(&engine.close_loan(args.id, now).await?)?,
            LoanCommand::Show(args) => print_json(&engine.loan(args.id).await?)?,
            LoanCommand::Balance(args) => {
                print_json(&engine.remaining_balance(args.member).await?)?
            }
            LoanCommand::List(args) => print_json(&engine.member_loans(args.member).await?)?,
            LoanCommand::Pending => print_json(&engine.pending_loans().await?)?,
        },
        Command::Maturity(MaturityCmd { command }) => match command {
            MaturityCommand::Generate { as_of } => {
                print_json(&engine.generate_maturity_records(as_of.unwrap_or(now)).await?)?
            }
            MaturityCommand::Adjust {
                id,
                interest,
                clear,
            } => {
                let view = engine
                    .adjust_maturity(id, !clear, interest.map(Money::minor), now)
                    .await?;
                print_json(&view)?
            }
            MaturityCommand::Claim(args) => print_json(&engine.claim(args.id, now).await?)?,
            MaturityCommand::Show(args) => print_json(&engine.maturity_record(args.id).await?)?,
            MaturityCommand::Member(args) => {
                print_json(&engine.member_maturity_record(args.member).await?)?
            }
            MaturityCommand::List { status } => {
                print_json(&engine.maturity_records(status).await?)?
            }
        },
        Command::Integrity => {
            let report = engine.integrity_check().await?;
            print_json(&report)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_flags_parse() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from([
            "coop_admin",
            "loan",
            "approve",
            "--id",
            &id,
            "--override-cap",
            "--installments",
            "12",
            "--emi",
            "220.50",
        ])
        .unwrap();
        let Command::Loan(LoanCmd {
            command: LoanCommand::Approve(args),
        }) = cli.command
        else {
            panic!("expected loan approve");
        };
        assert!(args.override_cap);
        assert_eq!(args.installments, Some(12));
        assert_eq!(args.emi.map(Money::minor), Some(22_050));
    }

    #[test]
    fn schedule_needs_both_flags() {
        let id = Uuid::new_v4().to_string();
        let result = Cli::try_parse_from([
            "coop_admin",
            "loan",
            "approve",
            "--id",
            &id,
            "--installments",
            "12",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn passbook_range_flags_parse() {
        let member = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from([
            "coop_admin",
            "passbook",
            "--member",
            &member,
            "--from",
            "2025-03-01T00:00:00Z",
            "--limit",
            "20",
        ])
        .unwrap();
        let Command::Passbook(args) = cli.command else {
            panic!("expected passbook");
        };
        assert!(args.from.is_some());
        assert_eq!(args.to, None);
        assert_eq!(args.limit, Some(20));
    }
}
