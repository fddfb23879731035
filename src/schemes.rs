//! Rule-based MSME scheme eligibility engine (C12), pure and deterministic:
//! a fixed catalog of government schemes, each with an eligibility
//! predicate over an applicant profile, scored and ranked.

use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialCategory {
    General,
    Sc,
    St,
    Obc,
    Women,
    Minority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Manufacturing,
    Service,
    Trading,
    Agriculture,
}

/// What the assessor needs to know about the applicant; distinct from
/// `BusinessProfile` (which models an already-registered business's GST
/// identity, not loan-eligibility attributes). The boolean flags mirror the
/// `required_flags` gates in `scheme_compatibility_service.py`'s
/// `SCHEME_RULES` (urban/rural/SHG status, GST/Udyam registration, DPIIT
/// recognition, traditional-artisan status).
#[derive(Debug, Clone)]
pub struct SchemeApplicantProfile {
    pub project_cost: Money,
    pub annual_turnover: Money,
    pub social_category: SocialCategory,
    pub sector: Sector,
    pub is_new_business: bool,
    pub employment_generated: u32,
    pub is_urban: bool,
    pub is_rural: bool,
    pub is_shg_member: bool,
    pub is_women_led_shg: bool,
    pub has_gst: bool,
    pub has_udyam: bool,
    pub is_dpiit_recognized: bool,
    pub is_traditional_artisan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeAssessment {
    pub scheme_id: String,
    pub name: String,
    pub eligible: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

type Predicate = fn(&SchemeApplicantProfile) -> (bool, Vec<String>);

struct SchemeDef {
    id: &'static str,
    name: &'static str,
    predicate: Predicate,
}

/// Catalog of real MSME schemes, ported from `SCHEME_RULES` in
/// `scheme_compatibility_service.py` (the PDF-grounded handbook "Know Your
/// Lender, Grow Your Business", Ministry of MSME).
const CATALOG: &[SchemeDef] = &[
    SchemeDef { id: "pmmy", name: "Pradhan Mantri MUDRA Yojana (PMMY)", predicate: assess_pmmy },
    SchemeDef { id: "pmegp", name: "Prime Minister Employment Generation Programme (PMEGP)", predicate: assess_pmegp },
    SchemeDef { id: "pm_vishwakarma", name: "PM Vishwakarma Scheme", predicate: assess_pm_vishwakarma },
    SchemeDef { id: "nulm", name: "National Urban Livelihoods Mission (NULM)", predicate: assess_nulm },
    SchemeDef { id: "nrlm", name: "National Rural Livelihoods Mission (NRLM)", predicate: assess_nrlm },
    SchemeDef { id: "gst_sahay", name: "GST Sahay (Invoice Based Financing)", predicate: assess_gst_sahay },
    SchemeDef { id: "cgtmse_cgs", name: "CGTMSE Credit Guarantee Scheme (CGS)", predicate: assess_cgtmse_cgs },
    SchemeDef { id: "cgss_startup", name: "Credit Guarantee Scheme for Startups (CGSS)", predicate: assess_cgss_startup },
];

/// PMMY: Shishu/Kishore/Tarun/Tarun Plus tiers up to 20 lakh, open to
/// startup and expansion, excludes the farm sector (Section 10.1).
fn assess_pmmy(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    if profile.sector == Sector::Agriculture {
        eligible = false;
        reasons.push("PMMY excludes farm-sector activity".to_string());
    }

    let max_loan = Money::from_paise(20_00_000_00);
    if profile.project_cost > max_loan {
        eligible = false;
        reasons.push(format!("loan requirement exceeds the {max_loan} PMMY ceiling"));
    } else {
        let tier = crate::mudra::MudraCategory::classify(profile.project_cost);
        reasons.push(format!("falls in the {tier:?} PMMY tier"));
    }

    (eligible, reasons)
}

/// PMEGP: new manufacturing units up to 50 lakh project cost, new service
/// units up to 20 lakh; existing units and trading are not eligible
/// (Section 10.2).
fn assess_pmegp(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    if !profile.is_new_business {
        eligible = false;
        reasons.push("PMEGP funds only new projects, not expansion of existing units".to_string());
    }

    let limit = match profile.sector {
        Sector::Manufacturing => Some(Money::from_paise(50_00_000_00)),
        Sector::Service => Some(Money::from_paise(20_00_000_00)),
        Sector::Trading | Sector::Agriculture => None,
    };
    match limit {
        Some(limit) if profile.project_cost <= limit => {
            reasons.push(format!("project cost within the {limit} PMEGP limit"));
        }
        Some(limit) => {
            eligible = false;
            reasons.push(format!("project cost exceeds the {limit} PMEGP limit for this sector"));
        }
        None => {
            eligible = false;
            reasons.push("PMEGP covers manufacturing and service units only".to_string());
        }
    }

    (eligible, reasons)
}

/// PM Vishwakarma: traditional artisans/craftspeople, collateral-free
/// credit in two tranches plus a toolkit incentive (Section 10.3).
fn assess_pm_vishwakarma(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    if profile.is_traditional_artisan {
        (true, vec!["applicant has traditional artisan/craftsperson status".to_string()])
    } else {
        (false, vec!["scheme is for traditional artisans/craftspeople".to_string()])
    }
}

/// NULM: urban beneficiaries only; individuals up to 2 lakh, SHGs up to 10
/// lakh, collateral-free (Section 10.4).
fn assess_nulm(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    if !profile.is_urban {
        eligible = false;
        reasons.push("NULM is targeted at urban beneficiaries".to_string());
    }

    let limit = if profile.is_shg_member { Money::from_paise(10_00_000_00) } else { Money::from_paise(2_00_000_00) };
    if profile.project_cost > limit {
        eligible = false;
        reasons.push(format!("loan requirement exceeds the {limit} NULM limit for this applicant type"));
    }

    (eligible, reasons)
}

/// NRLM: rural, women-led SHG beneficiaries only, collateral-free up to 10
/// lakh (Section 10.5).
fn assess_nrlm(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    if !profile.is_rural {
        eligible = false;
        reasons.push("NRLM is a rural livelihood program".to_string());
    }
    if !profile.is_shg_member {
        eligible = false;
        reasons.push("NRLM support is routed through SHGs".to_string());
    }
    if !profile.is_women_led_shg {
        eligible = false;
        reasons.push("NRLM prioritizes women-led SHG structures".to_string());
    }

    let max_loan = Money::from_paise(10_00_000_00);
    if profile.project_cost > max_loan {
        eligible = false;
        reasons.push(format!("loan requirement exceeds the {max_loan} NRLM collateral-free cap"));
    }

    (eligible, reasons)
}

/// GST Sahay: invoice-based working capital, requires both GST and Udyam
/// registration (Section 9.3).
fn assess_gst_sahay(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    if !profile.has_gst {
        eligible = false;
        reasons.push("GST Sahay requires GST registration".to_string());
    }
    if !profile.has_udyam {
        eligible = false;
        reasons.push("GST Sahay requires Udyam-registered MSE profile".to_string());
    }
    if eligible {
        reasons.push("GST and Udyam registration confirmed".to_string());
    }

    (eligible, reasons)
}

/// CGTMSE CGS: collateral-free credit guarantee cover up to 10 crore
/// (Section 1.3).
fn assess_cgtmse_cgs(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    let max_cover = Money::from_paise(10_00_00_000_00);
    if profile.project_cost > max_cover {
        eligible = false;
        reasons.push(format!("loan requirement exceeds the {max_cover} CGTMSE guarantee cap"));
    } else {
        reasons.push("within the CGTMSE collateral-free guarantee cap".to_string());
    }

    (eligible, reasons)
}

/// CGSS: guarantee cover for DPIIT-recognized startups up to 20 crore
/// (Section 1.3).
fn assess_cgss_startup(profile: &SchemeApplicantProfile) -> (bool, Vec<String>) {
    let mut reasons = Vec::new();
    let mut eligible = true;

    if !profile.is_dpiit_recognized {
        eligible = false;
        reasons.push("CGSS applies to DPIIT-recognized startups".to_string());
    }
    if !profile.is_new_business {
        eligible = false;
        reasons.push("CGSS covers startup-stage funding only".to_string());
    }

    let max_cover = Money::from_paise(20_00_00_000_00);
    if profile.project_cost > max_cover {
        eligible = false;
        reasons.push(format!("loan requirement exceeds the {max_cover} CGSS guarantee cap"));
    }

    (eligible, reasons)
}

/// Score rewards eligibility and employment generated.
fn score(profile: &SchemeApplicantProfile, eligible: bool) -> f64 {
    if !eligible {
        return 0.0;
    }
    let employment_bonus = (profile.employment_generated as f64 * 2.0).min(20.0);
    let base = 70.0;
    (base + employment_bonus).min(100.0)
}

/// Runs every scheme's predicate against `profile` and returns assessments
/// ranked highest-score first.
pub fn assess(profile: &SchemeApplicantProfile) -> Vec<SchemeAssessment> {
    let mut results: Vec<SchemeAssessment> = CATALOG
        .iter()
        .map(|scheme| {
            let (eligible, reasons) = (scheme.predicate)(profile);
            SchemeAssessment {
                scheme_id: scheme.id.to_string(),
                name: scheme.name.to_string(),
                eligible,
                score: score(profile, eligible),
                reasons,
            }
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_profile() -> SchemeApplicantProfile {
        SchemeApplicantProfile {
            project_cost: Money::from_paise(3_00_000_00),
            annual_turnover: Money::from_paise(10_00_000_00),
            social_category: SocialCategory::General,
            sector: Sector::Manufacturing,
            is_new_business: true,
            employment_generated: 3,
            is_urban: false,
            is_rural: false,
            is_shg_member: false,
            is_women_led_shg: false,
            has_gst: false,
            has_udyam: false,
            is_dpiit_recognized: false,
            is_traditional_artisan: false,
        }
    }

    #[test]
    fn new_manufacturing_unit_within_limit_is_pmegp_eligible() {
        let assessments = assess(&base_profile());
        let pmegp = assessments.iter().find(|a| a.scheme_id == "pmegp").unwrap();
        assert!(pmegp.eligible);
    }

    #[test]
    fn existing_business_is_not_pmegp_eligible() {
        let mut profile = base_profile();
        profile.is_new_business = false;
        let assessments = assess(&profile);
        let pmegp = assessments.iter().find(|a| a.scheme_id == "pmegp").unwrap();
        assert!(!pmegp.eligible);
    }

    #[test]
    fn trading_sector_is_not_pmegp_eligible() {
        let mut profile = base_profile();
        profile.sector = Sector::Trading;
        let assessments = assess(&profile);
        let pmegp = assessments.iter().find(|a| a.scheme_id == "pmegp").unwrap();
        assert!(!pmegp.eligible);
    }

    #[test]
    fn non_artisan_is_not_pm_vishwakarma_eligible() {
        let assessments = assess(&base_profile());
        let viswakarma = assessments.iter().find(|a| a.scheme_id == "pm_vishwakarma").unwrap();
        assert!(!viswakarma.eligible);
    }

    #[test]
    fn traditional_artisan_is_pm_vishwakarma_eligible() {
        let mut profile = base_profile();
        profile.is_traditional_artisan = true;
        let assessments = assess(&profile);
        let viswakarma = assessments.iter().find(|a| a.scheme_id == "pm_vishwakarma").unwrap();
        assert!(viswakarma.eligible);
    }

    #[test]
    fn rural_women_led_shg_within_cap_is_nrlm_eligible() {
        let mut profile = base_profile();
        profile.is_rural = true;
        profile.is_shg_member = true;
        profile.is_women_led_shg = true;
        profile.project_cost = Money::from_paise(5_00_000_00);
        let assessments = assess(&profile);
        let nrlm = assessments.iter().find(|a| a.scheme_id == "nrlm").unwrap();
        assert!(nrlm.eligible);
    }

    #[test]
    fn urban_profile_is_not_nrlm_eligible() {
        let assessments = assess(&base_profile());
        let nrlm = assessments.iter().find(|a| a.scheme_id == "nrlm").unwrap();
        assert!(!nrlm.eligible);
    }

    #[test]
    fn missing_gst_or_udyam_is_not_gst_sahay_eligible() {
        let mut profile = base_profile();
        profile.has_gst = true;
        let assessments = assess(&profile);
        let gst_sahay = assessments.iter().find(|a| a.scheme_id == "gst_sahay").unwrap();
        assert!(!gst_sahay.eligible);
    }

    #[test]
    fn gst_and_udyam_registered_is_gst_sahay_eligible() {
        let mut profile = base_profile();
        profile.has_gst = true;
        profile.has_udyam = true;
        let assessments = assess(&profile);
        let gst_sahay = assessments.iter().find(|a| a.scheme_id == "gst_sahay").unwrap();
        assert!(gst_sahay.eligible);
    }

    #[test]
    fn non_dpiit_startup_is_not_cgss_eligible() {
        let assessments = assess(&base_profile());
        let cgss = assessments.iter().find(|a| a.scheme_id == "cgss_startup").unwrap();
        assert!(!cgss.eligible);
    }

    #[test]
    fn results_are_sorted_by_score_descending() {
        let assessments = assess(&base_profile());
        for window in assessments.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }
}
