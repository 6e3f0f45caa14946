use std::time::Instant;

use chrono::Utc;
use fabula_checkpoint::{JobRecord, PhaseRecord};
use fabula_config::ProfileSet;
use fabula_interpreter::{StructuredRecord, interpret};
use fabula_llm::{CompletionRequest, GatewayError};
use fabula_phases::{InputError, PhaseContext, PhaseInputs, cover_art_record, cover_prompt_from_inputs, text_phase};
use fabula_utils::types::{InterpretationQuality, PhaseId, PhaseStatus, Usage};
use tracing::warn;

use super::PhaseOrchestrator;
use crate::telemetry::TelemetryEvent;

/// Label used for image queries before a backend has been chosen.
const IMAGE_CHAIN: &str = "image-chain";

/// A phase error that fails the phase and halts the job.
#[derive(Debug)]
pub(crate) struct Fatal {
    pub message: String,
    pub gateway: Option<GatewayError>,
}

impl From<GatewayError> for Fatal {
    fn from(err: GatewayError) -> Self {
        Self {
            message: err.to_string(),
            gateway: Some(err),
        }
    }
}

impl From<InputError> for Fatal {
    fn from(err: InputError) -> Self {
        Self {
            message: err.to_string(),
            gateway: None,
        }
    }
}

/// A completed phase record plus what the memory write-back needs.
pub(crate) struct PhaseSuccess {
    pub record: PhaseRecord,
    pub reasoning: Option<String>,
    pub quality: InterpretationQuality,
    pub model: String,
}

struct Completion {
    output: StructuredRecord,
    quality: InterpretationQuality,
    warnings: Vec<String>,
    provider: String,
    model: String,
    usage: Usage,
    cost_usd: f64,
}

fn completed_record(running: &PhaseRecord, done: Completion, started: Instant) -> PhaseRecord {
    PhaseRecord {
        status: PhaseStatus::Completed,
        output: Some(done.output.to_value()),
        error: None,
        duration_ms: Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)),
        model: Some(done.model),
        provider: Some(done.provider),
        cost_usd: done.cost_usd,
        usage: done.usage,
        degraded: done.quality.is_degraded(),
        interpretation: Some(done.quality),
        warnings: done.warnings,
        completed_at: Some(Utc::now()),
        ..running.clone()
    }
}

impl PhaseOrchestrator {
    pub(super) async fn execute_phase(
        &self,
        job: &JobRecord,
        profiles: &ProfileSet,
        running: &PhaseRecord,
        inputs: PhaseInputs,
        started: Instant,
    ) -> Result<PhaseSuccess, Fatal> {
        if running.name.is_image_phase() {
            self.execute_cover_art(job, profiles, running, &inputs, started)
                .await
        } else {
            self.execute_text_phase(job, profiles, running, &inputs, started)
                .await
        }
    }

    async fn execute_text_phase(
        &self,
        job: &JobRecord,
        profiles: &ProfileSet,
        running: &PhaseRecord,
        inputs: &PhaseInputs,
        started: Instant,
    ) -> Result<PhaseSuccess, Fatal> {
        let id = running.name;
        let phase = text_phase(id).ok_or_else(|| Fatal {
            message: format!("{id} is not a text phase"),
            gateway: None,
        })?;
        let profile = profiles.for_phase(id).ok_or_else(|| Fatal {
            message: format!("profile set '{}' defines no model for {id}", profiles.name),
            gateway: None,
        })?;

        let traces = self.retrieve_traces(id);
        let ctx = PhaseContext {
            job_id: &job.job_id,
            title: &job.title,
            source_text: &job.source_text,
            inputs,
            traces: &traces,
        };
        let messages = phase.messages(&ctx)?;

        let prompt_chars = messages.iter().map(|m| m.content.len()).sum();
        self.telemetry().emit(TelemetryEvent::query_sent(
            &job.job_id,
            id,
            &profile.model_id,
            prompt_chars,
        ));

        let response = self
            .gateway
            .complete(CompletionRequest {
                job_id: job.job_id.to_string(),
                phase: id,
                profile: profile.clone(),
                messages,
            })
            .await?;

        if let Some(reasoning) = &response.reasoning {
            self.telemetry().emit(TelemetryEvent::reasoning_observed(
                &job.job_id,
                id,
                &response.model,
                response.usage.reasoning_tokens,
                reasoning.chars().count(),
            ));
        }
        self.telemetry().emit(TelemetryEvent::response_received(
            &job.job_id,
            id,
            &response.model,
            response.usage.total_tokens(),
            response.cost_usd,
        ));

        let interpretation = interpret(id, &response.text);
        let quality = interpretation.quality;
        let mut warnings = interpretation.warnings;
        let output = phase.postprocess(interpretation.record, &ctx)?;
        warnings.extend(output.warnings);
        for warning in &warnings {
            warn!(job_id = %job.job_id, phase = %id, "{warning}");
        }

        let record = completed_record(
            running,
            Completion {
                output: output.record,
                quality,
                warnings,
                provider: response.provider,
                model: response.model.clone(),
                usage: response.usage,
                cost_usd: response.cost_usd,
            },
            started,
        );
        Ok(PhaseSuccess {
            record,
            reasoning: response.reasoning,
            quality,
            model: response.model,
        })
    }

    async fn execute_cover_art(
        &self,
        job: &JobRecord,
        profiles: &ProfileSet,
        running: &PhaseRecord,
        inputs: &PhaseInputs,
        started: Instant,
    ) -> Result<PhaseSuccess, Fatal> {
        let id = running.name;
        let prompt = cover_prompt_from_inputs(inputs, &job.title)?;

        self.telemetry().emit(TelemetryEvent::query_sent(
            &job.job_id,
            id,
            IMAGE_CHAIN,
            prompt.len(),
        ));
        let result = self.gateway.generate_image(&prompt, &profiles.image).await?;
        self.telemetry().emit(TelemetryEvent::response_received(
            &job.job_id,
            id,
            &result.model,
            0,
            result.cost_usd,
        ));

        let mut warnings = Vec::new();
        if let Some(primary_error) = &result.primary_error {
            let warning = format!(
                "primary image backend failed ({primary_error}); served by {}",
                result.backend
            );
            warn!(job_id = %job.job_id, phase = %id, "{warning}");
            warnings.push(warning);
        }

        let art = cover_art_record(prompt, &result);
        let record = completed_record(
            running,
            Completion {
                output: StructuredRecord::CoverArt(art),
                quality: InterpretationQuality::Clean,
                warnings,
                provider: result.backend.clone(),
                model: result.model.clone(),
                usage: Usage {
                    payload_bytes: result.usage_bytes,
                    ..Usage::default()
                },
                cost_usd: result.cost_usd,
            },
            started,
        );
        Ok(PhaseSuccess {
            record,
            reasoning: None,
            quality: InterpretationQuality::Clean,
            model: result.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_kept_on_fatal() {
        let fatal = Fatal::from(GatewayError::ProviderQuota("rate limited".to_string()));
        assert!(fatal.gateway.is_some());
        assert!(fatal.message.contains("rate limited"));
    }

    #[test]
    fn test_completed_record_marks_degraded() {
        let running = PhaseRecord::pending(PhaseId::CharacterProfiles).begin_attempt();
        let record = completed_record(
            &running,
            Completion {
                output: fabula_interpreter::safe_default(PhaseId::CharacterProfiles),
                quality: InterpretationQuality::Defaulted,
                warnings: vec!["safe default used".to_string()],
                provider: "scripted".to_string(),
                model: "m".to_string(),
                usage: Usage::default(),
                cost_usd: 0.0,
            },
            Instant::now(),
        );
        assert_eq!(record.status, PhaseStatus::Completed);
        assert!(record.degraded);
        assert_eq!(record.attempts, 1);
        assert!(record.completed_at.is_some());
    }
}
