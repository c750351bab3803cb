use std::fmt::Debug;

use cucumber::World;
use log::*;
use payment_notify_engine::{
    test_utils::{
        fixtures::GatewayFixture,
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    NotificationApi,
    NotificationReceipt,
    ProcessingSettings,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct NotificationWorld {
    pub system: Option<NotificationSystem>,
    pub last_receipt: Option<NotificationReceipt>,
    /// The parameters of the last Alipay notification sent, so that it can be redelivered.
    pub last_alipay_params: Option<Vec<(String, String)>>,
}

pub struct NotificationSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub api: NotificationApi<SqliteDatabase>,
    pub gateways: GatewayFixture,
}

impl Debug for NotificationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationSystem ({})", self.db_path)
    }
}

impl NotificationWorld {
    pub fn system(&self) -> &NotificationSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn receipt(&self) -> &NotificationReceipt {
        self.last_receipt.as_ref().expect("No notification has been processed yet")
    }
}

impl NotificationSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let gateways = GatewayFixture::new();
        let api = NotificationApi::new(db.clone(), gateways.keys.clone(), ProcessingSettings::default());
        Self { db_path: url, db, api, gateways }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
