//! PostgreSQL implementation of the service store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{
    AuthStore, InvokeRecord, PublishClaim, PublishStatus, PublishedServiceInfo, ServiceAuth,
    ServiceStore, StoreError,
};

/// PostgreSQL-backed service, auth and invocation storage.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct ServiceRow {
    service_id: String,
    agency: String,
    status: String,
    status_msg: String,
    service_config: String,
    pending_config: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for PublishedServiceInfo {
    type Error = StoreError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            service_id: row.service_id,
            agency: row.agency,
            status: row.status.parse()?,
            status_msg: row.status_msg,
            service_config: row.service_config,
            pending_config: row.pending_config,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AuthRow {
    service_id: String,
    access_key_id: String,
    access_secret: String,
    expire_at: Option<DateTime<Utc>>,
}

impl From<AuthRow> for ServiceAuth {
    fn from(row: AuthRow) -> Self {
        Self {
            service_id: row.service_id,
            access_key_id: row.access_key_id,
            access_secret: row.access_secret,
            expire_at: row.expire_at,
        }
    }
}

#[derive(FromRow)]
struct InvokeRow {
    invoke_id: Uuid,
    service_id: String,
    invoker: String,
    status: String,
    message: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl TryFrom<InvokeRow> for InvokeRecord {
    type Error = StoreError;

    fn try_from(row: InvokeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            invoke_id: row.invoke_id,
            service_id: row.service_id,
            invoker: row.invoker,
            status: row.status.parse()?,
            message: row.message,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

impl PostgresStore {
    /// Connect and run migrations.
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(
            max_connections,
            min_connections,
            "Service store connected and migrations applied"
        );
        Ok(store)
    }

    /// Create a store from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceStore for PostgresStore {
    async fn get(&self, service_id: &str) -> Result<Option<PublishedServiceInfo>, StoreError> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT service_id, agency, status, status_msg, service_config, pending_config,
                   created_at, updated_at
            FROM pir_published_services
            WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PublishedServiceInfo::try_from).transpose()
    }

    async fn upsert(&self, info: &PublishedServiceInfo) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pir_published_services
                (service_id, agency, status, status_msg, service_config, pending_config,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (service_id) DO UPDATE SET
                agency = EXCLUDED.agency,
                status = EXCLUDED.status,
                status_msg = EXCLUDED.status_msg,
                service_config = EXCLUDED.service_config,
                pending_config = EXCLUDED.pending_config,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&info.service_id)
        .bind(&info.agency)
        .bind(info.status.as_str())
        .bind(&info.status_msg)
        .bind(&info.service_config)
        .bind(&info.pending_config)
        .bind(info.created_at)
        .bind(info.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn begin_publish(
        &self,
        info: &PublishedServiceInfo,
    ) -> Result<PublishClaim, StoreError> {
        // SET expressions read the row as it was before the update
        let status: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO pir_published_services
                (service_id, agency, status, status_msg, service_config, pending_config,
                 created_at, updated_at)
            VALUES ($1, $2, 'Publishing', '', $3, NULL, $4, $4)
            ON CONFLICT (service_id) DO UPDATE SET
                agency = EXCLUDED.agency,
                status = CASE WHEN pir_published_services.status = 'PublishSuccess'
                    THEN pir_published_services.status ELSE 'Publishing' END,
                status_msg = CASE WHEN pir_published_services.status = 'PublishSuccess'
                    THEN pir_published_services.status_msg ELSE '' END,
                service_config = CASE WHEN pir_published_services.status = 'PublishSuccess'
                    THEN pir_published_services.service_config
                    ELSE EXCLUDED.service_config END,
                pending_config = CASE WHEN pir_published_services.status = 'PublishSuccess'
                    THEN EXCLUDED.service_config ELSE NULL END,
                updated_at = EXCLUDED.updated_at
            WHERE pir_published_services.status <> 'Publishing'
                AND pir_published_services.pending_config IS NULL
            RETURNING status
            "#,
        )
        .bind(&info.service_id)
        .bind(&info.agency)
        .bind(&info.service_config)
        .bind(info.created_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match status.as_deref() {
            None => PublishClaim::InProgress,
            Some("PublishSuccess") => PublishClaim::Staged,
            Some(_) => PublishClaim::Started,
        })
    }

    async fn finish_publish(
        &self,
        service_id: &str,
        status: PublishStatus,
        status_msg: &str,
    ) -> Result<PublishedServiceInfo, StoreError> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            UPDATE pir_published_services SET
                status = CASE WHEN pending_config IS NULL THEN $2::TEXT ELSE status END,
                service_config = CASE
                    WHEN pending_config IS NOT NULL AND $2::TEXT = 'PublishSuccess'
                    THEN pending_config ELSE service_config END,
                pending_config = NULL,
                status_msg = $3,
                updated_at = NOW()
            WHERE service_id = $1
            RETURNING service_id, agency, status, status_msg, service_config, pending_config,
                      created_at, updated_at
            "#,
        )
        .bind(service_id)
        .bind(status.as_str())
        .bind(status_msg)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(service_id.to_string()))?;

        PublishedServiceInfo::try_from(row)
    }

    async fn list(
        &self,
        agency: &str,
        status: Option<PublishStatus>,
    ) -> Result<Vec<PublishedServiceInfo>, StoreError> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT service_id, agency, status, status_msg, service_config, pending_config,
                   created_at, updated_at
            FROM pir_published_services
            WHERE agency = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY service_id
            "#,
        )
        .bind(agency)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PublishedServiceInfo::try_from).collect()
    }

    async fn record_invocation(&self, record: &InvokeRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pir_service_invocations
                (invoke_id, service_id, invoker, status, message, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.invoke_id)
        .bind(&record.service_id)
        .bind(&record.invoker)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn invocations(&self, service_id: &str) -> Result<Vec<InvokeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, InvokeRow>(
            r#"
            SELECT invoke_id, service_id, invoker, status, message, started_at, finished_at
            FROM pir_service_invocations
            WHERE service_id = $1
            ORDER BY started_at
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(InvokeRecord::try_from).collect()
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for PostgresStore {
    async fn find_auth(
        &self,
        service_id: &str,
        access_key_id: &str,
    ) -> Result<Option<ServiceAuth>, StoreError> {
        let row = sqlx::query_as::<_, AuthRow>(
            r#"
            SELECT service_id, access_key_id, access_secret, expire_at
            FROM pir_service_auth
            WHERE service_id = $1 AND access_key_id = $2
            "#,
        )
        .bind(service_id)
        .bind(access_key_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ServiceAuth::from))
    }

    async fn grant(&self, auth: &ServiceAuth) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pir_service_auth (service_id, access_key_id, access_secret, expire_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (service_id, access_key_id) DO UPDATE SET
                access_secret = EXCLUDED.access_secret,
                expire_at = EXCLUDED.expire_at
            "#,
        )
        .bind(&auth.service_id)
        .bind(&auth.access_key_id)
        .bind(&auth.access_secret)
        .bind(auth.expire_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}
