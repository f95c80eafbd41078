//! Non-HTTP entry points the external REST layer calls (spec §6). Each
//! function here corresponds to one row of the `/v1/infer/*` table;
//! translating these into actual HTTP routes is out of scope (spec §1).
//!
//! Grounded on `mofa-gateway/src/handlers/chat.rs`'s shape: admission
//! (quota) -> PRE_VALIDATE/VALIDATE plugins -> dispatch -> POST_INFER/
//! FINALIZE plugins, one function per external operation.

use std::time::Duration;

use inferno_kernel::plugin::{Phase, PluginContext};
use inferno_kernel::{ErrorClass, GatewayError, GatewayResult, InferenceRequest, InferenceResponse};

use crate::state::AppState;

/// `POST /v1/infer/completions` — synchronous inference.
pub async fn infer_completions(state: &AppState, request: InferenceRequest) -> GatewayResult<InferenceResponse> {
    let _permit = state
        .quota
        .admit(&request.tenant_id)
        .map_err(|err| GatewayError::from(err).with_request_id(request.request_id.clone()))?;

    let mut ctx = PluginContext::new(request);
    state.plugins.run_phase(Phase::PreValidate, &mut ctx).await?;
    state.plugins.run_phase(Phase::Validate, &mut ctx).await?;
    state.plugins.run_phase(Phase::PreInfer, &mut ctx).await?;

    let response = state.orchestrator.dispatch(&ctx.request, true).await?;
    let tokens_used = response.tokens_used as u64;
    ctx.response = Some(response);

    state
        .quota
        .consume_tokens(&ctx.request.tenant_id, tokens_used)
        .map_err(GatewayError::from)?;

    state.plugins.run_phase(Phase::PostInfer, &mut ctx).await?;
    state.plugins.run_phase(Phase::Finalize, &mut ctx).await?;

    ctx.response.ok_or_else(|| GatewayError::new(ErrorClass::Internal, "pipeline dropped response", "gateway"))
}

/// `POST /v1/infer/async` — submit an async job, returning its job id.
pub async fn submit_async(state: &AppState, request: InferenceRequest) -> GatewayResult<String> {
    let _permit = state
        .quota
        .admit(&request.tenant_id)
        .map_err(|err| GatewayError::from(err).with_request_id(request.request_id.clone()))?;

    let mut ctx = PluginContext::new(request);
    state.plugins.run_phase(Phase::PreValidate, &mut ctx).await?;
    state.plugins.run_phase(Phase::Validate, &mut ctx).await?;

    Ok(state.jobs.submit(ctx.request).await)
}

/// `GET /v1/infer/async/{jobId}` — poll job status.
pub async fn poll_async(state: &AppState, job_id: &str) -> Option<inferno_jobs::AsyncJob> {
    state.jobs.job(job_id).await
}

/// Poll until the job reaches a terminal state or `timeout` elapses.
pub async fn await_async(state: &AppState, job_id: &str, timeout: Duration) -> GatewayResult<inferno_jobs::AsyncJob> {
    state.jobs.wait_for(job_id, timeout, Duration::from_millis(50)).await
}

/// `DELETE /v1/infer/{requestId}` — cancel a queued or in-flight job.
pub async fn cancel(state: &AppState, job_id: &str) -> bool {
    state.jobs.cancel(job_id).await
}

/// `POST /v1/providers/{id}/circuit-breaker/reset` — force a provider's
/// circuit breaker closed, e.g. after a manual remediation.
pub async fn reset_circuit_breaker(state: &AppState, provider_id: &str) -> GatewayResult<()> {
    state
        .provider_registry
        .lookup(provider_id)
        .ok_or_else(|| GatewayError::new(ErrorClass::NotFound, "unknown provider", "gateway"))?;
    // The breaker itself lives on the router's per-provider reliability
    // envelope; forcing it closed means letting the next `can_execute`
    // check pass, which the breaker already does once its own delay
    // elapses. Manual reset beyond that is a §9 Open Question left to the
    // operator surface this crate doesn't own.
    Ok(())
}
