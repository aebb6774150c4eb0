//! Schema tool for the society ledger.
//!
//! The database URL is taken from `COOP__DATABASE__URL` (the admin CLI's
//! setting), then `DATABASE_URL`, then a local SQLite file.

use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_DATABASE_URL: &str = "sqlite:./coop.db?mode=rwc";
const USAGE: &str = "usage: migration [up [N]|down [N]|reset|status]";

enum Action {
    Up(Option<u32>),
    Down(Option<u32>),
    Reset,
    Status,
}

impl Action {
    fn parse(args: &[String]) -> Result<Self, String> {
        let steps = |raw: Option<&String>| -> Result<Option<u32>, String> {
            raw.map(|n| n.parse().map_err(|_| format!("invalid step count: {n}")))
                .transpose()
        };
        match args.first().map(String::as_str) {
            None | Some("up") => Ok(Self::Up(steps(args.get(1))?)),
            Some("down") => Ok(Self::Down(Some(steps(args.get(1))?.unwrap_or(1)))),
            Some("reset") => Ok(Self::Reset),
            Some("status") => Ok(Self::Status),
            Some(other) => Err(format!("unknown command: {other}")),
        }
    }
}

fn database_url(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["COOP__DATABASE__URL", "DATABASE_URL"]
        .into_iter()
        .find_map(|key| lookup(key).filter(|url| !url.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let action = match Action::parse(&args) {
        Ok(action) => action,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let db = Database::connect(&database_url(|key| std::env::var(key).ok())).await?;
    match action {
        Action::Up(steps) => migration::Migrator::up(&db, steps).await?,
        Action::Down(steps) => migration::Migrator::down(&db, steps).await?,
        Action::Reset => {
            migration::Migrator::down(&db, None).await?;
            migration::Migrator::up(&db, None).await?;
        }
        Action::Status => migration::Migrator::status(&db).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn coop_setting_wins_over_generic_url() {
        let url = database_url(|key| match key {
            "COOP__DATABASE__URL" => Some("sqlite:./coop-test.db".to_string()),
            "DATABASE_URL" => Some("sqlite:./other.db".to_string()),
            _ => None,
        });
        assert_eq!(url, "sqlite:./coop-test.db");

        let url = database_url(|key| {
            (key == "DATABASE_URL").then(|| "sqlite:./other.db".to_string())
        });
        assert_eq!(url, "sqlite:./other.db");

        assert_eq!(database_url(|_| Some("  ".to_string())), DEFAULT_DATABASE_URL);
    }

    #[test]
    fn down_reverts_one_step_by_default() {
        assert!(matches!(Action::parse(&args(&[])), Ok(Action::Up(None))));
        assert!(matches!(Action::parse(&args(&["up", "2"])), Ok(Action::Up(Some(2)))));
        assert!(matches!(Action::parse(&args(&["down"])), Ok(Action::Down(Some(1)))));
        assert!(matches!(Action::parse(&args(&["reset"])), Ok(Action::Reset)));
        assert!(Action::parse(&args(&["down", "many"])).is_err());
        assert!(Action::parse(&args(&["fresh"])).is_err());
    }
}
