#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    Engine, EngineBuilder, InterestRate, MaturityTerm, Notification, Notifier, NotifyError,
};
use migration::MigratorTrait;
use uuid::Uuid;

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    build_engine(InterestRate::default(), None).await
}

pub async fn build_engine(
    rate: InterestRate,
    notifier: Option<Arc<dyn Notifier>>,
) -> (Engine, DatabaseConnection) {
    let mut builder = Engine::builder().interest_rate(rate);
    if let Some(notifier) = notifier {
        builder = builder.notifier(notifier);
    }
    finish(builder).await
}

pub async fn engine_with_term(term: MaturityTerm) -> (Engine, DatabaseConnection) {
    finish(Engine::builder().maturity_term(term)).await
}

async fn finish(builder: EngineBuilder) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    (builder.database(db.clone()).build().await.unwrap(), db)
}

pub async fn add_member(
    db: &DatabaseConnection,
    name: &str,
    enrolled_at: DateTime<Utc>,
    user_id: Option<&str>,
) -> Uuid {
    let id = Uuid::new_v4();
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "INSERT INTO members (id, name, status, enrolled_at, user_id) VALUES (?, ?, ?, ?, ?)",
        vec![
            id.to_string().into(),
            name.into(),
            "active".into(),
            enrolled_at.into(),
            user_id.map(ToString::to_string).into(),
        ],
    ))
    .await
    .unwrap();
    id
}

pub async fn deactivate_member(db: &DatabaseConnection, member_id: Uuid) {
    let backend = db.get_database_backend();
    db.execute(Statement::from_sql_and_values(
        backend,
        "UPDATE members SET status = 'inactive' WHERE id = ?",
        vec![member_id.to_string().into()],
    ))
    .await
    .unwrap();
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// Rupees to paise.
pub fn inr(rupees: i64) -> i64 {
    rupees * 100
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError("gateway unavailable".to_string()))
    }
}
