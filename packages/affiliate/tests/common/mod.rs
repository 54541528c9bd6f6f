#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use netpulse_affiliate::{
    Actor, AffiliateSettings, Balances, Ledger, SettingsStore, UpdateSettingsInput,
    collaborators::{AesGcmEncryption, AuditEntry, AuditError, AuditSink},
    entity::{
        affiliate_profile,
        sea_orm_active_enums::{AffiliateStatus, PayoutMethod},
        user,
    },
    ledger::EnrollInput,
    schema,
    sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set},
};

pub const KEY: &str = "4f1c8e2a9b7d6c5e3f2a1b0c9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e";

pub struct TestEnv {
    pub db: DatabaseConnection,
    pub ledger: Ledger,
    pub settings: AffiliateSettings,
    pub encryption: AesGcmEncryption,
}

/// One shared in-memory connection so every query sees the same database.
pub async fn connect() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connection");
    schema::create_tables(&db).await.expect("schema");
    db
}

pub async fn setup() -> TestEnv {
    let db = connect().await;
    SettingsStore::ensure_default(&db).await.unwrap();
    let settings = SettingsStore::update(
        &db,
        UpdateSettingsInput {
            commission_value: Some(100),
            referral_hold_days: Some(7),
            payout_minimum: Some(50),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    TestEnv {
        ledger: Ledger::new(db.clone()),
        encryption: AesGcmEncryption::from_hex(KEY).unwrap(),
        settings,
        db,
    }
}

pub async fn create_user(db: &DatabaseConnection, id: &str, name: &str) -> user::Model {
    user::ActiveModel {
        id: Set(id.to_string()),
        name: Set(name.to_string()),
        email: Set(format!("{id}@example.com")),
        referral_code: Set(Some(format!("REF-{}", id.to_uppercase()))),
        disabled_at: Set(None),
        created_at: Set(chrono::Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub fn enroll_input() -> EnrollInput {
    EnrollInput {
        payout_method: PayoutMethod::Bank,
        provider_name: "BCA".into(),
        account_name: "Jane Doe".into(),
        account_number: "1234567890".into(),
    }
}

/// Creates the user and an approved affiliate profile with zero balances.
pub async fn approved_affiliate(env: &TestEnv, user_id: &str) -> affiliate_profile::Model {
    create_user(&env.db, user_id, &format!("User {user_id}")).await;
    let profile = env
        .ledger
        .enroll(
            &Actor::new(user_id),
            enroll_input(),
            &env.settings,
            &env.encryption,
        )
        .await
        .unwrap();
    env.ledger
        .update_profile_status(&profile.id, AffiliateStatus::Approved, &admin())
        .await
        .unwrap()
}

pub fn admin() -> Actor {
    Actor::new("admin-1").with_ip("203.0.113.7")
}

/// Grants `amount` with no hold and releases it, leaving it available.
pub async fn fund_available(env: &TestEnv, profile: &affiliate_profile::Model, amount: i64) {
    env.ledger
        .grant_commission(&profile.id, None, amount, "test funding", 0)
        .await
        .unwrap();
    env.ledger.release_held_commissions().await.unwrap();
}

pub async fn balances(env: &TestEnv, profile_id: &str) -> Balances {
    let profile = env.ledger.get_profile(profile_id).await.unwrap();
    let balances = Balances::from(&profile);
    assert!(
        balances.is_consistent(),
        "ledger invariant broken: {balances:?}"
    );
    balances
}

/// Audit sink that keeps entries in memory, or fails every write.
#[derive(Default)]
pub struct RecordingAudit {
    pub entries: Mutex<Vec<AuditEntry>>,
    pub fail: bool,
}

impl RecordingAudit {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if self.fail {
            return Err(AuditError::Unavailable("audit store offline".into()));
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}
