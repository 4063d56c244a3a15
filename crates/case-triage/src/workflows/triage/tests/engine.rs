use std::time::Duration;

use super::common::*;
use crate::workflows::triage::audit::{AuditEntry, RemediationOutcomeKind};
use crate::workflows::triage::checklist::{Checklist, ChecklistError};
use crate::workflows::triage::domain::{
    ActionDirective, CaseStatus, MatchSource, PendencyKind, TriageWarning,
};
use crate::workflows::triage::engine::TriageError;
use crate::workflows::triage::matcher::ClassifierError;
use crate::workflows::triage::remediation::GenerationError;

fn labels(actions: &[ActionDirective]) -> Vec<&'static str> {
    actions.iter().map(ActionDirective::label).collect()
}

#[tokio::test]
async fn missing_certificate_is_generated_from_tax_id() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(Some("contrato.pdf")))
            .reply("CartaoCNPJ", json_reply(None)),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(request("card-a", vec![contract_with_tax_id()]), generated_at())
        .await
        .expect("run completes");

    assert_eq!(result.overall_status, CaseStatus::NonBlockingPending);
    assert_eq!(result.items[0].source, MatchSource::Ai);
    assert_eq!(result.items[1].source, MatchSource::AutoGenerated);
    assert_eq!(
        result.items[1].generated.as_ref().map(|g| g.identifier.as_str()),
        Some(TAX_ID)
    );
    assert_eq!(result.pendencies.len(), 1);
    assert_eq!(result.pendencies[0].kind, PendencyKind::NonBlocking);

    assert_eq!(
        labels(&result.actions),
        vec!["generate_document", "notify_channel", "move_card"]
    );
    assert_eq!(
        result.actions.last(),
        Some(&ActionDirective::MoveCard {
            target_phase: "pending_review".to_string()
        })
    );

    assert_eq!(h.generator.calls(), 1);
    let requests = h.generator.requests.lock().expect("request mutex poisoned");
    assert_eq!(requests[0].identifying_code, TAX_ID);
    assert_eq!(requests[0].document_type, "cartaocnpj");
}

#[tokio::test]
async fn missing_certificate_without_tax_id_blocks_the_case() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(Some("contrato.pdf")))
            .reply("CartaoCNPJ", json_reply(None)),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-b",
                vec![document("contrato.pdf", "CONTRATO SOCIAL sem identificação fiscal")],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(result.overall_status, CaseStatus::BlockingPending);
    let blocking: Vec<_> = result.blocking().collect();
    assert_eq!(blocking.len(), 1);
    assert_eq!(blocking[0].item_name, "CartaoCNPJ");
    assert_eq!(blocking[0].suggested_deadline.as_deref(), Some("2025-04-02"));
    assert_eq!(labels(&result.actions), vec!["notify_channel"]);
    assert_eq!(h.generator.calls(), 0);

    assert!(result.audit.iter().any(|entry| matches!(
        entry,
        AuditEntry::RemediationAttempt {
            outcome: RemediationOutcomeKind::NoIdentifyingCode,
            identifying_code: None,
            ..
        }
    )));
}

#[tokio::test]
async fn generated_certificate_does_not_lift_a_missing_contract() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(None))
            .reply("CartaoCNPJ", json_reply(None)),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-mixed",
                vec![document(
                    "procuracao.pdf",
                    "PROCURAÇÃO outorgada pela empresa inscrita no CNPJ 12.345.678/0001-99",
                )],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(result.overall_status, CaseStatus::BlockingPending);
    assert_eq!(result.items[0].source, MatchSource::Absent);
    assert_eq!(result.items[1].source, MatchSource::AutoGenerated);
    let kinds: Vec<_> = result.pendencies.iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![PendencyKind::Blocking, PendencyKind::NonBlocking]);

    assert_eq!(
        labels(&result.actions),
        vec!["generate_document", "notify_channel"]
    );
    match &result.actions[1] {
        ActionDirective::NotifyChannel { message, .. } => {
            assert!(message.contains("ContratoSocial"));
            assert!(!message.contains("CartaoCNPJ"));
        }
        other => panic!("unexpected directive {other:?}"),
    }
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test]
async fn fully_matched_case_is_approved() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(Some("contrato.pdf")))
            .reply("CartaoCNPJ", json_reply(Some("cartao_cnpj.pdf"))),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-c",
                vec![
                    contract_with_tax_id(),
                    document("cartao_cnpj.pdf", "COMPROVANTE DE INSCRIÇÃO E DE SITUAÇÃO CADASTRAL"),
                ],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(result.overall_status, CaseStatus::Approved);
    assert!(result.pendencies.is_empty());
    assert_eq!(
        result.actions,
        vec![ActionDirective::MoveCard {
            target_phase: "approved".to_string()
        }]
    );
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn classifier_timeout_degrades_single_item() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(Some("contrato.pdf")))
            .delay("ContratoSocial", Duration::from_millis(200))
            .reply("CartaoCNPJ", json_reply(Some("cartao_cnpj.pdf"))),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-d",
                vec![
                    document("contrato.pdf", "CONTRATO SOCIAL"),
                    document("cartao_cnpj.pdf", "CARTÃO CNPJ"),
                ],
            ),
            generated_at(),
        )
        .await
        .expect("run still completes");

    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].source, MatchSource::Absent);
    assert_eq!(result.items[1].source, MatchSource::Ai);
    assert_eq!(result.overall_status, CaseStatus::BlockingPending);
    assert_eq!(h.classifier.calls_for("ContratoSocial"), 3);
    assert!(result.warnings.iter().any(|warning| matches!(
        warning,
        TriageWarning::ClassifierUnavailable { item_name, attempts: 3, .. } if item_name == "ContratoSocial"
    )));
}

#[tokio::test]
async fn transient_failures_are_retried_then_succeed() {
    let h = harness(
        ScriptedClassifier::default()
            .fail("ContratoSocial", ClassifierError::Transient("502".to_string()))
            .reply("ContratoSocial", json_reply(Some("contrato.pdf")))
            .reply("CartaoCNPJ", json_reply(Some("cartao_cnpj.pdf"))),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-retry",
                vec![document("contrato.pdf", ""), document("cartao_cnpj.pdf", "")],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(h.classifier.calls_for("ContratoSocial"), 2);
    assert_eq!(result.overall_status, CaseStatus::Approved);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn rejected_requests_are_not_retried() {
    let h = harness(
        ScriptedClassifier::default()
            .fail("ContratoSocial", ClassifierError::Rejected("401".to_string()))
            .reply("CartaoCNPJ", json_reply(Some("cartao_cnpj.pdf"))),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-rejected",
                vec![document("contrato.pdf", ""), document("cartao_cnpj.pdf", "")],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(h.classifier.calls_for("ContratoSocial"), 1);
    assert_eq!(result.items[0].source, MatchSource::Absent);
}

#[tokio::test]
async fn generation_failure_is_recorded_and_blocks() {
    let h = harness(
        ScriptedClassifier::default().reply("ContratoSocial", json_reply(Some("contrato.pdf"))),
        MockGenerator::failing(GenerationError::Transient("registry offline".to_string())),
    );

    let result = h
        .engine
        .run_at(request("card-fail", vec![contract_with_tax_id()]), generated_at())
        .await
        .expect("run completes");

    assert_eq!(h.generator.calls(), 1);
    assert_eq!(result.items[1].source, MatchSource::Absent);
    assert_eq!(result.overall_status, CaseStatus::BlockingPending);
    assert!(result.warnings.iter().any(|warning| matches!(
        warning,
        TriageWarning::RemediationFailed { item_name, .. } if item_name == "CartaoCNPJ"
    )));
    assert!(result.audit.iter().any(|entry| matches!(
        entry,
        AuditEntry::RemediationAttempt {
            outcome: RemediationOutcomeKind::Failed,
            reference_or_error: Some(detail),
            ..
        } if detail.contains("registry offline")
    )));
}

#[tokio::test]
async fn slow_generation_times_out_without_retry() {
    let h = harness(
        ScriptedClassifier::default().reply("ContratoSocial", json_reply(Some("contrato.pdf"))),
        MockGenerator::slow(Duration::from_millis(500)),
    );

    let result = h
        .engine
        .run_at(request("card-slow", vec![contract_with_tax_id()]), generated_at())
        .await
        .expect("run completes");

    assert_eq!(h.generator.calls(), 1);
    assert_eq!(result.items[1].source, MatchSource::Absent);
    assert_eq!(result.overall_status, CaseStatus::BlockingPending);
}

#[tokio::test]
async fn remediation_runs_at_most_once_per_run() {
    let checklist = Checklist::new(vec![
        item("CartaoCNPJ", true, "Cadastral"),
        item("ComprovanteInscricao", true, "Cartão CNPJ"),
    ])
    .expect("valid checklist");
    let h = harness_with(
        ScriptedClassifier::default(),
        MockGenerator::failing(GenerationError::Rejected("invalid".to_string())),
        checklist,
        &settings(),
    );

    let result = h
        .engine
        .run_at(request("card-once", vec![contract_with_tax_id()]), generated_at())
        .await
        .expect("run completes");

    assert_eq!(h.generator.calls(), 1);
    let attempts = result
        .audit
        .iter()
        .filter(|entry| matches!(entry, AuditEntry::RemediationAttempt { .. }))
        .count();
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn unknown_candidate_is_a_warning_not_a_match() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(Some("contrato_final_v2.pdf")))
            .reply("CartaoCNPJ", json_reply(Some("cartao_cnpj.pdf"))),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-unknown",
                vec![document("contrato.pdf", ""), document("cartao_cnpj.pdf", "")],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(result.items[0].source, MatchSource::Absent);
    assert_eq!(
        result.warnings,
        vec![TriageWarning::UnknownCandidate {
            item_name: "ContratoSocial".to_string(),
            named: "contrato_final_v2.pdf".to_string(),
        }]
    );
}

#[tokio::test]
async fn every_decision_is_audited_with_prompt_and_reply() {
    let h = harness(
        ScriptedClassifier::default()
            .reply("ContratoSocial", json_reply(Some("contrato.pdf")))
            .reply("CartaoCNPJ", json_reply(Some("cartao_cnpj.pdf"))),
        MockGenerator::succeeding(),
    );

    let result = h
        .engine
        .run_at(
            request(
                "card-audit",
                vec![contract_with_tax_id(), document("cartao_cnpj.pdf", "")],
            ),
            generated_at(),
        )
        .await
        .expect("run completes");

    assert_eq!(result.audit.len(), 2);
    assert_eq!(h.audit.entries(), result.audit);
    for entry in &result.audit {
        match entry {
            AuditEntry::MatchDecision {
                item_name,
                candidates_considered,
                prompt,
                raw_response,
                decision,
                ..
            } => {
                assert_eq!(candidates_considered.len(), 2);
                let prompt = prompt.as_deref().expect("prompt captured");
                assert!(prompt.contains(&format!("Checklist item: {item_name}")));
                assert!(raw_response.is_some());
                assert!(decision.starts_with("matched: "));
            }
            other => panic!("unexpected audit entry {other:?}"),
        }
    }
}

#[tokio::test]
async fn empty_submission_skips_the_classifier() {
    let h = harness(ScriptedClassifier::default(), MockGenerator::succeeding());

    let result = h
        .engine
        .run_at(request("card-empty", Vec::new()), generated_at())
        .await
        .expect("run completes");

    assert_eq!(h.classifier.total_calls(), 0);
    assert!(result
        .items
        .iter()
        .all(|item| item.source == MatchSource::Absent));
    assert_eq!(result.blocking().count(), 2);
}

#[tokio::test]
async fn every_checklist_item_appears_once_in_order() {
    let checklist = Checklist::new(vec![
        item("ContratoSocial", true, "Societário"),
        item("CartaoCNPJ", true, "Cadastral"),
        item("ComprovanteEndereco", false, "Cadastral"),
        item("DocumentoSocio", true, "Pessoal"),
        item("Procuracao", false, "Pessoal"),
    ])
    .expect("valid checklist");
    let mut tight = settings();
    tight.max_concurrency = 1;
    let h = harness_with(
        ScriptedClassifier::default()
            .reply("DocumentoSocio", json_reply(Some("rg.jpg")))
            .delay("ContratoSocial", Duration::from_millis(10)),
        MockGenerator::succeeding(),
        checklist.clone(),
        &tight,
    );

    let result = h
        .engine
        .run_at(
            request("card-order", vec![document("rg.jpg", "REGISTRO GERAL")]),
            generated_at(),
        )
        .await
        .expect("run completes");

    let names: Vec<_> = result.items.iter().map(|r| r.item.name.as_str()).collect();
    let expected: Vec<_> = checklist.items().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, expected);
    assert_eq!(result.pendencies.len(), 4);
    assert_eq!(result.overall_status, CaseStatus::BlockingPending);
}

#[tokio::test]
async fn inline_checklist_overrides_provider_and_is_validated() {
    let h = harness(ScriptedClassifier::default(), MockGenerator::succeeding());

    let mut empty = request("card-config", Vec::new());
    empty.checklist = Some(Vec::new());
    let error = h
        .engine
        .run(empty)
        .await
        .expect_err("empty checklist is fatal");
    assert!(matches!(
        error,
        TriageError::Configuration(ChecklistError::Empty)
    ));

    let mut inline = request("card-inline", Vec::new());
    inline.checklist = Some(vec![item("Procuracao", false, "Pessoal")]);
    let result = h.engine.run(inline).await.expect("run completes");
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.overall_status, CaseStatus::NonBlockingPending);
}

#[tokio::test]
async fn blank_case_id_is_rejected() {
    let h = harness(ScriptedClassifier::default(), MockGenerator::succeeding());

    let error = h
        .engine
        .run(request("  ", Vec::new()))
        .await
        .expect_err("blank case id");

    assert!(matches!(error, TriageError::InvalidRequest(_)));
}
