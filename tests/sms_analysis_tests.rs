use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sms_guardian::phone_reputation::WebSpamLookup;
use sms_guardian::store::{
    MemoryStore, SpamRecord, SpamRegistry, SpamSource, SpamType, WhitelistRegistry,
};
use sms_guardian::threat_intel::{ExternalVerdict, ThreatIntelProvider};
use sms_guardian::{
    AnalysisFailure, CompiledPatterns, Config, SmsAnalyzer, ThreatLevel, ThreatSource, Thresholds,
};
use std::sync::Arc;
use std::time::Duration;

const BBVA_VISHING: &str = "BBVA: Se ha realizado una compra de 49,99 EUR. Si es correcto utiliza el codigo 102508. NUNCA lo compartas. Si no lo reconoces llame al 931845156";
const CASUAL: &str = "Hola, ¿cómo estás? ¿Nos vemos luego para tomar algo?";
const ABANCA_VISHING: &str = "ABANCA para la compra de 49990 euros utiliza el codigo 677120, si no reconoce esta operacion llame al 612203803";
const SANTANDER_ALERT: &str = "Su cuenta Santander ha sido bloqueada por seguridad. Acceda para verificar su identidad: http://bit.ly/fake-bank";
const AEAT_REFUND: &str = "AEAT: Tienes una devolucion pendiente de 450,12 EUR. Acceda para gestionar: http://aeat-refund.top";
const SEUR_DELIVERY: &str = "SEUR: Su entrega se ha suspendido debido a la falta del numero de casa. Verifique aqui: http://bit.ly/seur-check";

/// Web lookup reporting a fixed set of numbers.
struct ReportedNumbers(Vec<&'static str>);

#[async_trait]
impl WebSpamLookup for ReportedNumbers {
    async fn check(&self, phone_number: &str) -> Result<bool> {
        Ok(self.0.iter().any(|n| phone_number.contains(n)))
    }
}

struct FailingRegistry;

#[async_trait]
impl WhitelistRegistry for FailingRegistry {
    async fn is_whitelisted(&self, _phone_number: &str) -> Result<bool> {
        Err(anyhow!("contacts permission denied"))
    }
}

#[async_trait]
impl SpamRegistry for FailingRegistry {
    async fn lookup(&self, _phone_number: &str) -> Result<Option<SpamRecord>> {
        Err(anyhow!("database not initialized"))
    }
}

struct HangingWhitelist;

#[async_trait]
impl WhitelistRegistry for HangingWhitelist {
    async fn is_whitelisted(&self, _phone_number: &str) -> Result<bool> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(true)
    }
}

struct PanickingRegistry;

#[async_trait]
impl SpamRegistry for PanickingRegistry {
    async fn lookup(&self, phone_number: &str) -> Result<Option<SpamRecord>> {
        panic!("corrupted record for {}", phone_number);
    }
}

struct ScriptedProvider {
    verdict: ExternalVerdict,
}

#[async_trait]
impl ThreatIntelProvider for ScriptedProvider {
    fn source(&self) -> ThreatSource {
        ThreatSource::VirusTotal
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn query(&self, _url: &str) -> Result<Option<ExternalVerdict>> {
        Ok(Some(self.verdict.clone()))
    }
}

struct UnreachableProvider;

#[async_trait]
impl ThreatIntelProvider for UnreachableProvider {
    fn source(&self) -> ThreatSource {
        ThreatSource::GoogleSafeBrowsing
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn query(&self, url: &str) -> Result<Option<ExternalVerdict>> {
        panic!("official domain {} must not be scanned online", url);
    }
}

fn patterns() -> Arc<CompiledPatterns> {
    Arc::new(CompiledPatterns::spain().unwrap())
}

fn analyzer(store: Arc<MemoryStore>) -> SmsAnalyzer {
    SmsAnalyzer::new(patterns(), store.clone(), store)
}

#[tokio::test]
async fn test_vishing_with_reported_number_is_held() {
    let analyzer = analyzer(Arc::new(MemoryStore::new()))
        .with_web_lookup(Arc::new(ReportedNumbers(vec!["931845156"])));

    let result = analyzer.analyze("+34600000000", BBVA_VISHING).await;
    assert!(result.should_quarantine || result.should_block);
    assert!(result.suspicious_score > 70);
    assert_eq!(result.threat_level, ThreatLevel::Malicious);

    let details = result.reputation_details.unwrap();
    assert_eq!(details.body_numbers.len(), 1);
    assert_eq!(details.body_numbers[0].score, 85);
    assert_eq!(result.breakdown.unwrap().body_phone_score, 85);
}

#[tokio::test]
async fn test_reported_number_in_short_message_names_the_number() {
    let analyzer = analyzer(Arc::new(MemoryStore::new()))
        .with_web_lookup(Arc::new(ReportedNumbers(vec!["931845156"])));

    // content 40 (two phrases) + 30 (number) = 70, body number 85
    let result = analyzer
        .analyze("+34600000000", "Si no lo reconoce llame al 931845156")
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert_eq!(result.suspicious_score, 155);
    assert!(result.reason.contains("number in body"));
}

#[tokio::test]
async fn test_casual_message_is_safe() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+34612345678", CASUAL)
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Safe);
    assert!(!result.should_block);
    assert!(!result.should_quarantine);
    assert_eq!(result.suspicious_score, 0);
    assert_eq!(result.reason, "Passed security checks");
}

#[tokio::test]
async fn test_whitelisted_sender_is_always_safe() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_contact("+34 612 345 678", "Ana", sms_guardian::store::ContactSource::Manual)
        .await;
    // Even a listed spammer is let through once the user saved the contact
    store
        .add_spam_number("+34612345678", SpamType::Scam, SpamSource::Community)
        .await;

    let result = analyzer(store)
        .with_web_lookup(Arc::new(ReportedNumbers(vec!["931845156"])))
        .analyze("+34612345678", BBVA_VISHING)
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Safe);
    assert_eq!(result.suspicious_score, 0);
    assert_eq!(result.reason, "Contact whitelist");
    assert!(result.reputation_details.is_none());
}

#[tokio::test]
async fn test_spam_list_overrides_content() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_spam_number("699111222", SpamType::Commercial, SpamSource::Manual)
        .await;

    let result = analyzer(store).analyze("699 111 222", CASUAL).await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert!(result.should_block && result.should_quarantine);
    assert_eq!(result.suspicious_score, 60);
    assert_eq!(result.reason, "Spam database: commercial");
}

#[tokio::test]
async fn test_analysis_is_idempotent() {
    let analyzer = analyzer(Arc::new(MemoryStore::new()))
        .with_web_lookup(Arc::new(ReportedNumbers(vec!["931845156"])));
    let first = analyzer.analyze("+34600000000", BBVA_VISHING).await;
    let second = analyzer.analyze("+34600000000", BBVA_VISHING).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_failing_collaborators_are_ignored() {
    let failing = Arc::new(FailingRegistry);
    let analyzer = SmsAnalyzer::new(patterns(), failing.clone(), failing);

    let result = analyzer.analyze("+34612345678", CASUAL).await;
    assert_eq!(result.threat_level, ThreatLevel::Safe);
    assert_eq!(result.reason, "Passed security checks");

    let result = analyzer.analyze("806123456", "Llame ya").await;
    assert_eq!(result.reason, "Premium Rate Number");
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_whitelist_times_out() {
    let store = Arc::new(MemoryStore::new());
    let analyzer = SmsAnalyzer::new(patterns(), Arc::new(HangingWhitelist), store)
        .with_timeout(Duration::from_secs(5));

    let result = analyzer.analyze("+34612345678", CASUAL).await;
    assert_eq!(result.reason, "Passed security checks");
}

#[tokio::test]
async fn test_internal_panic_fails_open() {
    let store = Arc::new(MemoryStore::new());
    let analyzer = SmsAnalyzer::new(patterns(), store, Arc::new(PanickingRegistry));

    let failure = analyzer.try_analyze("+34612345678", BBVA_VISHING).await;
    assert!(matches!(failure, Err(AnalysisFailure::Panicked(ref m)) if m.contains("corrupted record")));

    let result = analyzer.analyze("+34612345678", BBVA_VISHING).await;
    assert_eq!(result.threat_level, ThreatLevel::Safe);
    assert!(!result.should_block && !result.should_quarantine);
    assert_eq!(result.suspicious_score, 0);
    assert_eq!(result.reason, "Analysis error - safe fallback");
}

#[tokio::test]
async fn test_threshold_boundaries() {
    // Content score 30: only the vishing bonus for a bare number
    let body = "Te dejo mi fijo: 912345678";
    let store = Arc::new(MemoryStore::new());

    let at_suspicious = analyzer(store.clone())
        .with_thresholds(Thresholds {
            suspicious: 30,
            malicious: 31,
        })
        .analyze("+34612345678", body)
        .await;
    assert_eq!(at_suspicious.suspicious_score, 30);
    assert_eq!(at_suspicious.threat_level, ThreatLevel::Suspicious);
    assert!(at_suspicious.should_quarantine);
    assert!(!at_suspicious.should_block);

    let below = analyzer(store.clone())
        .with_thresholds(Thresholds {
            suspicious: 31,
            malicious: 40,
        })
        .analyze("+34612345678", body)
        .await;
    assert_eq!(below.threat_level, ThreatLevel::Safe);
    assert!(!below.should_quarantine);

    let at_malicious = analyzer(store)
        .with_thresholds(Thresholds {
            suspicious: 20,
            malicious: 30,
        })
        .analyze("+34612345678", body)
        .await;
    assert_eq!(at_malicious.threat_level, ThreatLevel::Malicious);
    assert!(at_malicious.should_block && at_malicious.should_quarantine);
}

#[tokio::test]
async fn test_abanca_vishing_with_reported_number() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .with_web_lookup(Arc::new(ReportedNumbers(vec!["612203803"])))
        .analyze("+34600000000", ABANCA_VISHING)
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert!(result.should_block && result.should_quarantine);
    assert!(result.suspicious_score > 90);
    assert_eq!(result.breakdown.unwrap().body_phone_score, 85);
}

#[tokio::test]
async fn test_bank_alert_with_shortened_link() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+34600000000", SANTANDER_ALERT)
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert!(result.suspicious_score > 90);
    // shortener 30 + local verdict 50
    assert_eq!(result.breakdown.unwrap().url_score, 80);
}

#[tokio::test]
async fn test_tax_refund_on_suspicious_tld() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+34600000000", AEAT_REFUND)
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert!(result.suspicious_score > 90);
    // .top alone stays below the malicious URL bar: 40 / 4
    assert_eq!(result.breakdown.unwrap().url_score, 10);
}

#[tokio::test]
async fn test_courier_notice_with_shortened_link() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+34600000000", SEUR_DELIVERY)
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert!(result.suspicious_score > 90);
    assert_eq!(result.breakdown.unwrap().url_score, 80);
}

#[tokio::test]
async fn test_premium_number_in_body_with_international_prefix() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+34600000000", "Llame al 0034 806 123 456 para reclamar su premio")
        .await;
    let details = result.reputation_details.clone().unwrap();
    assert_eq!(details.body_numbers.len(), 1);
    assert!(details.body_numbers[0].is_premium);
    assert_eq!(result.breakdown.unwrap().body_phone_score, 90);
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
}

#[tokio::test]
async fn test_contact_matches_sender_in_any_format() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_contact("612 345 678", "Ana", sms_guardian::store::ContactSource::Manual)
        .await;

    for sender in ["+34612345678", "0034612345678", "612-345-678"] {
        let result = analyzer(store.clone()).analyze(sender, BBVA_VISHING).await;
        assert_eq!(result.reason, "Contact whitelist", "sender {}", sender);
    }
}

#[tokio::test]
async fn test_impersonation_url_is_blocked() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+34612345678", "Pago requerido: http://dgt.fake.xyz")
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert_eq!(result.breakdown.unwrap().url_score, 80);
}

#[tokio::test]
async fn test_official_domain_skips_online_scan() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .with_providers(vec![Arc::new(UnreachableProvider)])
        .analyze("+34612345678", "Consulta tus movimientos en https://www.bbva.es")
        .await;
    // A panic in the provider would surface as the fail-open reason
    assert_ne!(result.reason, "Analysis error - safe fallback");
    assert_eq!(result.breakdown.unwrap().url_score, 15);
}

#[tokio::test]
async fn test_external_verdict_raises_url_score() {
    let provider = ScriptedProvider {
        verdict: ExternalVerdict {
            is_malicious: true,
            confidence: 95,
            details: "Threat type: SOCIAL_ENGINEERING".to_string(),
        },
    };
    let result = analyzer(Arc::new(MemoryStore::new()))
        .with_providers(vec![Arc::new(provider)])
        .analyze("+34612345678", "Mira https://example.com/promo")
        .await;
    assert_eq!(result.breakdown.unwrap().url_score, 80);
    assert_eq!(result.threat_level, ThreatLevel::Suspicious);
    assert_eq!(result.reason, "Suspicious content");
}

#[tokio::test]
async fn test_family_scam_is_blocked() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze(
            "+34677000111",
            "Hola mamá, se me ha roto el móvil. Este es mi número nuevo, necesito dinero para un pago urgente",
        )
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert_eq!(result.breakdown.unwrap().content_score, 100);
}

#[tokio::test]
async fn test_high_risk_sender_reason() {
    let result = analyzer(Arc::new(MemoryStore::new()))
        .analyze("+234 803 123 4567", "Su paquete de Correos está retenido en aduanas")
        .await;
    // reputation 70 + logistics content
    assert!(result.suspicious_score >= 90);
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
    assert_eq!(result.reason, "High suspicious score");
}

#[test]
fn test_extract_phone_numbers() {
    let analyzer = analyzer(Arc::new(MemoryStore::new()));
    assert!(analyzer
        .extract_phone_numbers("Llame al 912345678 para confirmar")
        .contains(&"912345678".to_string()));
}

#[tokio::test]
async fn test_analyzer_from_config() {
    let config = Config::from_yaml(
        r#"
security:
  suspicious_threshold: 70
  malicious_threshold: 90
web_spam:
  known_numbers: ["931845156"]
"#,
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let analyzer = SmsAnalyzer::from_config(&config, store.clone(), store).unwrap();
    assert_eq!(analyzer.thresholds(), Thresholds::default());

    let result = analyzer
        .analyze("+34600000000", "Si no lo reconoce llame al 931845156")
        .await;
    assert_eq!(result.threat_level, ThreatLevel::Malicious);
}
