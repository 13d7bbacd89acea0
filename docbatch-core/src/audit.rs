//! Audit trail of upload outcomes.
//!
//! [`SqliteAuditLog`] writes one row per terminal outcome through a small
//! connection pool sized to the worker count, so workers never assume they own
//! the connection. [`LogAuditSink`] is used when no database is configured.

use std::net::UdpSocket;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::contract::{AuditEntry, AuditSink};
use crate::error::AuditError;

pub const MODULE_NAME: &str = "docbatch-service";
pub const APP_USER: &str = "docbatch-user";
pub const ACTION: &str = "Uploading";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Who and where the uploads run from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub os_user: String,
    pub hostname: String,
    pub ipv4: String,
    pub mac: String,
}

impl MachineIdentity {
    pub fn detect() -> Self {
        Self {
            os_user: env_first(&["USER", "USERNAME"]).unwrap_or_else(|| "unknown".into()),
            hostname: hostname(),
            ipv4: local_ipv4().unwrap_or_else(|| "127.0.0.1".into()),
            mac: mac_address().unwrap_or_default(),
        }
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

fn hostname() -> String {
    env_first(&["HOSTNAME", "COMPUTERNAME", "HOST"])
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".into())
}

/// Address of the interface that would route outbound traffic. Connecting a
/// UDP socket sends no packets.
fn local_ipv4() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    addr.is_ipv4().then(|| addr.ip().to_string())
}

/// First non-loopback hardware address, formatted `AA-BB-CC-DD-EE-FF`.
/// Linux only; empty elsewhere.
fn mac_address() -> Option<String> {
    let mut interfaces: Vec<_> = std::fs::read_dir("/sys/class/net")
        .ok()?
        .filter_map(Result::ok)
        .filter(|e| e.file_name() != "lo")
        .collect();
    interfaces.sort_by_key(|e| e.file_name());
    interfaces.into_iter().find_map(|entry| {
        let raw = std::fs::read_to_string(entry.path().join("address")).ok()?;
        let raw = raw.trim();
        (!raw.is_empty() && raw != "00:00:00:00:00:00")
            .then(|| raw.to_uppercase().replace(':', "-"))
    })
}

pub fn timestamp_now() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub struct SqliteAuditLog {
    pool: SqlitePool,
    identity: MachineIdentity,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool, identity: MachineIdentity) -> Self {
        Self { pool, identity }
    }

    /// Open (or create) the audit database and make sure the table exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AuditError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        let log = Self::new(pool, MachineIdentity::detect());
        log.init().await?;
        info!(database_url, max_connections, "Audit log connected");
        Ok(log)
    }

    pub async fn init(&self) -> Result<(), AuditError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_dm_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module TEXT NOT NULL,
                os_user_name TEXT NOT NULL,
                app_user_name TEXT NOT NULL,
                machine_name TEXT NOT NULL,
                machine_ipv4 TEXT NOT NULL,
                mac TEXT NOT NULL,
                action_name TEXT NOT NULL,
                user_action TEXT NOT NULL,
                action_attribute TEXT NOT NULL,
                affected_customer TEXT NOT NULL,
                action_status TEXT NOT NULL,
                time_stamp TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_dm_changes (
                module, os_user_name, app_user_name, machine_name, machine_ipv4, mac,
                action_name, user_action, action_attribute, affected_customer,
                action_status, time_stamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(MODULE_NAME)
        .bind(self.identity.os_user.as_str())
        .bind(APP_USER)
        .bind(self.identity.hostname.as_str())
        .bind(self.identity.ipv4.as_str())
        .bind(self.identity.mac.as_str())
        .bind(ACTION)
        .bind(ACTION)
        .bind(entry.document_type.as_str())
        .bind(entry.affected_customer.as_str())
        .bind(entry.status.audit_label())
        .bind(timestamp_now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Audit connection closed");
    }
}

/// Writes audit entries to the log instead of a database.
#[derive(Debug, Clone)]
pub struct LogAuditSink {
    identity: MachineIdentity,
}

impl LogAuditSink {
    pub fn new() -> Self {
        Self {
            identity: MachineIdentity::detect(),
        }
    }
}

impl Default for LogAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            module = MODULE_NAME,
            os_user = %self.identity.os_user,
            machine = %self.identity.hostname,
            ipv4 = %self.identity.ipv4,
            document_type = %entry.document_type,
            affected_customer = %entry.affected_customer,
            status = entry.status.audit_label(),
            timestamp = %timestamp_now(),
            "Audit"
        );
        Ok(())
    }

    async fn close(&self) {}
}
