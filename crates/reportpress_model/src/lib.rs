use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

pub const MODEL_SCHEMA: &str = "reportpress.report_model";
pub const MODEL_VERSION: &str = "1";

pub mod keys {
    pub const N_ORD: &str = "n_ord";
    pub const N_ENT: &str = "n_ent";
    pub const N_CAN: &str = "n_can";
    pub const N_DEV: &str = "n_dev";
    pub const N_TRA: &str = "n_tra";
    pub const N_NC: &str = "n_nc";
    pub const TASA_ENT: &str = "tasa_ent";
    pub const TASA_CAN: &str = "tasa_can";
    pub const TASA_DEV: &str = "tasa_dev";
    pub const FACT_NETO: &str = "fact_neto";
    pub const ING_REAL: &str = "ing_real";
    pub const CPR: &str = "cpr";
    pub const FL_ENT: &str = "fl_ent";
    pub const FL_DEV: &str = "fl_dev";
    pub const FL_TRA: &str = "fl_tra";
    pub const G_ADS: &str = "g_ads";
    pub const U_REAL: &str = "u_real";
    pub const ROAS_BRUTO: &str = "roas_bruto";
    pub const ROAS_REAL: &str = "roas_real";
    pub const CPA: &str = "cpa";
    pub const CPE: &str = "cpe";
    pub const MER: &str = "mer";
    pub const PERC_ADS_REVENUE: &str = "perc_ads_revenue";
    pub const COSTO_DEV_ORDEN: &str = "costo_dev_orden";
    pub const UTILIDAD_POR_ENTREGA: &str = "utilidad_por_entrega";
    pub const FACT_DESPACHADA: &str = "fact_despachada";
    pub const UTILIDAD_PROYECTADA: &str = "utilidad_proyectada";
    pub const MARGEN_NETO: &str = "margen_neto";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Weekly => "weekly",
            ReportKind::Monthly => "monthly",
        }
    }
}

// Flat set of named metrics. Non-finite values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KpiSnapshot {
    values: BTreeMap<String, f64>,
}

impl KpiSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied().filter(|v| v.is_finite())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDirection {
    #[default]
    HigherIsBetter,
    LowerIsBetter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiTarget {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub unit: String,
    pub good: f64,
    pub warning: f64,
    #[serde(default)]
    pub direction: TargetDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl KpiTarget {
    pub fn new(key: impl Into<String>, good: f64, warning: f64, direction: TargetDirection) -> Self {
        Self {
            key: key.into(),
            label: String::new(),
            unit: String::new(),
            good,
            warning,
            direction,
            description: None,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>, unit: impl Into<String>) -> Self {
        self.label = label.into();
        self.unit = unit.into();
        self
    }

    pub fn is_inverse(&self) -> bool {
        self.direction == TargetDirection::LowerIsBetter
    }
}

pub fn default_kpi_targets() -> Vec<KpiTarget> {
    use TargetDirection::{HigherIsBetter as Up, LowerIsBetter as Down};
    vec![
        KpiTarget::new(keys::ROAS_REAL, 2.0, 1.5, Up).labeled("ROAS Real", "x"),
        KpiTarget::new(keys::CPA, 25_000.0, 30_000.0, Down).labeled("CPA", "$"),
        KpiTarget::new(keys::TASA_ENT, 65.0, 50.0, Up).labeled("Tasa de Entrega", "%"),
        KpiTarget::new(keys::TASA_CAN, 30.0, 40.0, Down).labeled("Tasa de Cancelacion", "%"),
        KpiTarget::new(keys::MARGEN_NETO, 15.0, 5.0, Up).labeled("Margen Neto", "%"),
        KpiTarget::new(keys::PERC_ADS_REVENUE, 25.0, 35.0, Down).labeled("% Ads vs Revenue", "%"),
        KpiTarget::new(keys::TASA_DEV, 10.0, 20.0, Down).labeled("Tasa de Devolucion", "%"),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetrics {
    pub name: String,
    #[serde(default)]
    pub order_count: u64,
    #[serde(default)]
    pub delivery_rate: Option<f64>,
    #[serde(default)]
    pub cancel_rate: Option<f64>,
    #[serde(default)]
    pub ad_spend: Option<f64>,
    #[serde(default)]
    pub real_profit: Option<f64>,
    #[serde(default)]
    pub projected_profit: Option<f64>,
}

impl ProductMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // Profit used to rank products: projected when known, real otherwise, zero when neither.
    pub fn ranking_profit(&self) -> f64 {
        self.projected_profit
            .filter(|v| v.is_finite())
            .or(self.real_profit.filter(|v| v.is_finite()))
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryMetrics {
    pub name: String,
    #[serde(default)]
    pub order_count: u64,
    #[serde(default)]
    pub delivery_rate: Option<f64>,
    #[serde(default)]
    pub cancel_rate: Option<f64>,
    #[serde(default)]
    pub sales: Option<f64>,
    #[serde(default)]
    pub ad_spend: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
    #[serde(default)]
    pub products: Vec<ProductMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSpend {
    pub platform: String,
    pub amount: f64,
    #[serde(default)]
    pub revenue: Option<f64>,
}

impl PlatformSpend {
    pub fn new(platform: impl Into<String>, amount: f64) -> Self {
        Self {
            platform: platform.into(),
            amount,
            revenue: None,
        }
    }

    pub fn roas(&self) -> Option<f64> {
        let revenue = self.revenue?;
        if self.amount > 0.0 && revenue.is_finite() {
            Some(revenue / self.amount)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn directive_keyword(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICA",
            Severity::Warning => "ATENCION",
            Severity::Info => "INFO",
        }
    }

    pub fn from_directive_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "CRITICA" => Some(Severity::Critical),
            "ATENCION" => Some(Severity::Warning),
            "INFO" => Some(Severity::Info),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportModel {
    pub title: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub report_kind: ReportKind,
    #[serde(default)]
    pub kpis: Option<KpiSnapshot>,
    #[serde(default)]
    pub previous_kpis: Option<KpiSnapshot>,
    #[serde(default)]
    pub kpi_targets: Vec<KpiTarget>,
    #[serde(default)]
    pub metrics_by_country: Vec<CountryMetrics>,
    #[serde(default)]
    pub ad_spend_by_platform: Vec<PlatformSpend>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub executive_summary: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
}

impl ReportModel {
    pub fn new(
        title: impl Into<String>,
        period: impl Into<String>,
        generated_at: DateTime<Utc>,
        report_kind: ReportKind,
    ) -> Self {
        Self {
            title: title.into(),
            period: period.into(),
            generated_at,
            report_kind,
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn products(&self) -> impl Iterator<Item = &ProductMetrics> {
        self.metrics_by_country
            .iter()
            .flat_map(|country| country.products.iter())
    }

    pub fn duplicate_products(&self) -> Vec<String> {
        let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
        let mut dupes: BTreeSet<String> = BTreeSet::new();
        for country in &self.metrics_by_country {
            for product in &country.products {
                match owner.get(product.name.as_str()) {
                    Some(existing) if *existing != country.name.as_str() => {
                        dupes.insert(product.name.clone());
                    }
                    Some(_) => {}
                    None => {
                        owner.insert(product.name.as_str(), country.name.as_str());
                    }
                }
            }
        }
        dupes.into_iter().collect()
    }

    pub fn fingerprint_sha256(&self) -> String {
        match serde_json::to_vec(self) {
            Ok(bytes) => hex_sha256(&bytes),
            Err(_) => hex_sha256(self.title.as_bytes()),
        }
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_model() -> ReportModel {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
        let mut model = ReportModel::new("Reporte Semanal", "24 feb - 1 mar", at, ReportKind::Weekly);
        model.kpis = Some(KpiSnapshot::new().with(keys::ROAS_REAL, 2.4).with(keys::N_ORD, 120.0));
        model.metrics_by_country = vec![CountryMetrics {
            name: "Colombia".to_string(),
            order_count: 120,
            products: vec![ProductMetrics::new("Serum")],
            ..CountryMetrics::default()
        }];
        model
    }

    #[test]
    fn parses_camel_case_host_payload() {
        let raw = r#"{
            "title": "Reporte Diario",
            "period": "Hoy",
            "generatedAt": "2026-03-02T08:30:00Z",
            "reportKind": "daily",
            "kpis": {"roas_real": 1.8, "cpa": 21000},
            "kpiTargets": [{"key": "cpa", "good": 25000, "warning": 30000, "direction": "lower_is_better"}],
            "metricsByCountry": [{"name": "Chile", "orderCount": 12, "products": [{"name": "Lampara", "projectedProfit": -4000}]}],
            "alerts": [{"severity": "CRITICAL", "message": "CPA fuera de rango"}]
        }"#;
        let model = ReportModel::from_json(raw).expect("payload should parse");
        assert_eq!(model.report_kind, ReportKind::Daily);
        assert_eq!(model.kpis.as_ref().and_then(|k| k.get(keys::CPA)), Some(21000.0));
        assert!(model.kpi_targets[0].is_inverse());
        assert_eq!(model.metrics_by_country[0].products[0].ranking_profit(), -4000.0);
        assert_eq!(model.alerts[0].severity, Severity::Critical);
        assert!(model.narrative.is_none());
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive_to_content() {
        let a = sample_model();
        let b = sample_model();
        assert_eq!(a.fingerprint_sha256(), b.fingerprint_sha256());
        assert_eq!(a.fingerprint_sha256().len(), 64);

        let mut c = sample_model();
        c.title.push('!');
        assert_ne!(a.fingerprint_sha256(), c.fingerprint_sha256());
    }

    #[test]
    fn snapshot_hides_non_finite_values() {
        let snapshot = KpiSnapshot::new().with("a", f64::NAN).with("b", 1.5);
        assert_eq!(snapshot.get("a"), None);
        assert_eq!(snapshot.get("b"), Some(1.5));
        assert_eq!(snapshot.get("missing"), None);
    }

    #[test]
    fn ranking_profit_prefers_projected() {
        let mut product = ProductMetrics::new("Kit");
        assert_eq!(product.ranking_profit(), 0.0);
        product.real_profit = Some(-10.0);
        assert_eq!(product.ranking_profit(), -10.0);
        product.projected_profit = Some(30.0);
        assert_eq!(product.ranking_profit(), 30.0);
    }

    #[test]
    fn duplicate_products_are_reported_once() {
        let mut model = sample_model();
        model.metrics_by_country.push(CountryMetrics {
            name: "Peru".to_string(),
            products: vec![ProductMetrics::new("Serum"), ProductMetrics::new("Faja")],
            ..CountryMetrics::default()
        });
        assert_eq!(model.duplicate_products(), vec!["Serum".to_string()]);
    }

    #[test]
    fn severity_keywords_are_a_closed_set() {
        for severity in [Severity::Critical, Severity::Warning, Severity::Info] {
            assert_eq!(
                Severity::from_directive_keyword(severity.directive_keyword()),
                Some(severity)
            );
        }
        assert_eq!(Severity::from_directive_keyword("UNKNOWN"), None);
        assert_eq!(Severity::from_directive_keyword("critica"), None);
    }

    #[test]
    fn default_targets_cover_inverse_metrics() {
        let targets = default_kpi_targets();
        let cpa = targets.iter().find(|t| t.key == keys::CPA).unwrap();
        assert!(cpa.is_inverse());
        let roas = targets.iter().find(|t| t.key == keys::ROAS_REAL).unwrap();
        assert!(!roas.is_inverse());
    }

    #[test]
    fn platform_roas_requires_positive_spend() {
        let mut spend = PlatformSpend::new("Meta", 0.0);
        spend.revenue = Some(100.0);
        assert_eq!(spend.roas(), None);
        spend.amount = 50.0;
        assert_eq!(spend.roas(), Some(2.0));
    }
}
