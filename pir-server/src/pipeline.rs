//! Query pipeline
//!
//! `received -> validated -> authorized -> (looked-up -> obfuscated)* -> aggregated`
//!
//! Every stage returns a [`PirError`]; the first one ends the query and is
//! turned into a [`QueryResponse::Failure`]. Nothing is looked up before the
//! request, the service status and the credential have all been accepted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pir_core::{
    AlgorithmType, ObfuscateQueryResult, ObfuscationEngine, ObfuscationParam, OtResult, PirError,
    QueryRequest, QueryResponse, Result, ServiceSetting,
};
use uuid::Uuid;

use crate::auth::{AuthDecision, CredentialVerifier};
use crate::row_source::RowSource;
use crate::store::{InvokeRecord, InvokeStatus, ServiceStore};

/// Request accepted by validation.
struct Validated {
    algorithm: AlgorithmType,
    setting: ServiceSetting,
}

/// Answers PIR queries against published services.
pub struct QueryPipeline {
    services: Arc<dyn ServiceStore>,
    verifier: Arc<dyn CredentialVerifier>,
    rows: Arc<dyn RowSource>,
    engine: Arc<ObfuscationEngine>,
    max_query_items: usize,
    max_rows_per_item: usize,
}

impl QueryPipeline {
    pub fn new(
        services: Arc<dyn ServiceStore>,
        verifier: Arc<dyn CredentialVerifier>,
        rows: Arc<dyn RowSource>,
        engine: Arc<ObfuscationEngine>,
        max_query_items: usize,
        max_rows_per_item: usize,
    ) -> Self {
        Self {
            services,
            verifier,
            rows,
            engine,
            max_query_items,
            max_rows_per_item,
        }
    }

    /// Run one query to completion. Expected failures are returned as values.
    pub async fn query(&self, request: &QueryRequest) -> QueryResponse {
        let started_at = Utc::now();
        let service_id = request.query_param.service_id.as_str();

        let validated = match self.validate(request).await {
            Ok(validated) => validated,
            Err(e) => return failure(service_id, None, e),
        };
        let dataset_id = validated.setting.dataset_id.clone();

        if let Err(e) = self.authorize(request).await {
            return failure(service_id, Some(dataset_id), e);
        }

        let response = match self.answer(request, &validated).await {
            Ok(result) => {
                tracing::info!(
                    service_id = %service_id,
                    dataset_id = %dataset_id,
                    algorithm = %validated.algorithm,
                    items = result.ot_results.len(),
                    "PIR query answered"
                );
                QueryResponse::Success { result }
            }
            Err(e) => failure(service_id, Some(dataset_id), e),
        };

        self.record_invocation(request, &response, started_at).await;
        response
    }

    async fn validate(&self, request: &QueryRequest) -> Result<Validated> {
        request.check(self.max_query_items)?;
        let param = &request.query_param;
        let algorithm = self.engine.resolve(&param.algorithm_type)?;
        self.engine
            .check_items(algorithm, &request.obfuscate_data.items)?;

        let info = self
            .services
            .get(&param.service_id)
            .await?
            .ok_or_else(|| PirError::NotFound(param.service_id.clone()))?;
        if !info.status.is_ready() {
            return Err(PirError::NotReady {
                service_id: param.service_id.clone(),
                status: info.status.to_string(),
            });
        }

        let setting = ServiceSetting::deserialize(&info.service_config)?;
        setting.check_search_type(&param.service_id, param.search_type)?;
        setting.check_algorithm_type(&param.service_id, algorithm)?;

        Ok(Validated { algorithm, setting })
    }

    async fn authorize(&self, request: &QueryRequest) -> Result<()> {
        let param = &request.query_param;
        match self.verifier.verify(&param.service_id, &param.credential).await {
            AuthDecision::Authorized => Ok(()),
            AuthDecision::Denied(reason) => Err(PirError::AuthorizationDenied(reason)),
        }
    }

    async fn answer(
        &self,
        request: &QueryRequest,
        validated: &Validated,
    ) -> Result<ObfuscateQueryResult> {
        let param = &request.query_param;
        let data = &request.obfuscate_data;
        let mut result = ObfuscateQueryResult::new(
            validated.setting.dataset_id.clone(),
            validated.algorithm.as_str(),
        );

        for item in &data.items {
            let rows = self
                .rows
                .fetch_rows(&validated.setting, param, item)
                .await?;
            if rows.is_empty() {
                result.ot_results.push(OtResult::empty());
                continue;
            }
            if rows.len() > self.max_rows_per_item {
                return Err(PirError::obfuscation(format!(
                    "Item {} matches {} rows, maximum is {}",
                    item.id_index,
                    rows.len(),
                    self.max_rows_per_item
                )));
            }

            let obfuscation = ObfuscationParam::new(data, validated.algorithm, param.search_type)?
                .with_index(item.id_index);
            let items = self.engine.obfuscate(&obfuscation, &rows, item)?;
            result.ot_results.push(OtResult::new(items));
        }

        Ok(result)
    }

    async fn record_invocation(
        &self,
        request: &QueryRequest,
        response: &QueryResponse,
        started_at: DateTime<Utc>,
    ) {
        let (status, message) = match response {
            QueryResponse::Success { .. } => (InvokeStatus::Success, "success".to_string()),
            QueryResponse::Failure { message, .. } => (InvokeStatus::Failed, message.clone()),
        };
        let record = InvokeRecord {
            invoke_id: Uuid::new_v4(),
            service_id: request.query_param.service_id.clone(),
            invoker: request.query_param.credential.access_key_id.clone(),
            status,
            message,
            started_at,
            finished_at: Utc::now(),
        };

        if let Err(e) = self.services.record_invocation(&record).await {
            tracing::warn!(
                service_id = %record.service_id,
                invoke_id = %record.invoke_id,
                error = %e,
                "Failed to record invocation"
            );
        }
    }
}

fn failure(service_id: &str, dataset_id: Option<String>, error: PirError) -> QueryResponse {
    tracing::warn!(
        service_id = %service_id,
        dataset_id = dataset_id.as_deref().unwrap_or(""),
        kind = ?error.kind(),
        error = %error,
        "PIR query failed"
    );
    QueryResponse::failure(dataset_id, &error)
}

impl std::fmt::Debug for QueryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPipeline")
            .field("engine", &self.engine)
            .field("max_query_items", &self.max_query_items)
            .field("max_rows_per_item", &self.max_rows_per_item)
            .finish()
    }
}
