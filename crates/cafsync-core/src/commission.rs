//! Commission classification.
//!
//! One canonical rule table per code family. Patterns use SQL `LIKE` wildcards (`%` any
//! run, `_` one character, whole-string match) so the same rows can be matched in-process
//! through compiled regexes or relationally through `LIKE`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Bumped whenever a rule is added, removed or reordered.
pub const RULESET_VERSION: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Commission {
    Escalade,
    Alpinisme,
    Randonnee,
    Canyon,
    SkiDeRandonnee,
    Vtt,
    Trail,
    ViaFerrata,
    SkiDePiste,
    SkiDeFond,
    Raquette,
    SnowboardRando,
    SnowboardAlpin,
    MarcheNordique,
    Formation,
    SkiRandonneeNordique,
    Environnement,
    VieDuClub,
}

impl Commission {
    pub const ALL: [Commission; 18] = [
        Commission::Escalade,
        Commission::Alpinisme,
        Commission::Randonnee,
        Commission::Canyon,
        Commission::SkiDeRandonnee,
        Commission::Vtt,
        Commission::Trail,
        Commission::ViaFerrata,
        Commission::SkiDePiste,
        Commission::SkiDeFond,
        Commission::Raquette,
        Commission::SnowboardRando,
        Commission::SnowboardAlpin,
        Commission::MarcheNordique,
        Commission::Formation,
        Commission::SkiRandonneeNordique,
        Commission::Environnement,
        Commission::VieDuClub,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Commission::Escalade => "escalade",
            Commission::Alpinisme => "alpinisme",
            Commission::Randonnee => "randonnee",
            Commission::Canyon => "canyon",
            Commission::SkiDeRandonnee => "ski-de-randonnee",
            Commission::Vtt => "vtt",
            Commission::Trail => "trail",
            Commission::ViaFerrata => "via-ferrata",
            Commission::SkiDePiste => "ski-de-piste",
            Commission::SkiDeFond => "ski-de-fond",
            Commission::Raquette => "raquette",
            Commission::SnowboardRando => "snowboard-rando",
            Commission::SnowboardAlpin => "snowboard-alpin",
            Commission::MarcheNordique => "marche-nordique",
            Commission::Formation => "formation",
            Commission::SkiRandonneeNordique => "ski-randonnee-nordique",
            Commission::Environnement => "environnement",
            Commission::VieDuClub => "vie-du-club",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug() == slug)
    }

    /// Stable id used when seeding a development store that has no commission table.
    pub fn dev_id(self) -> i64 {
        Self::ALL
            .iter()
            .position(|c| *c == self)
            .map(|i| i as i64 + 1)
            .unwrap_or_default()
    }
}

impl From<Commission> for &'static str {
    fn from(value: Commission) -> Self {
        value.slug()
    }
}

impl fmt::Display for Commission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// One row of the canonical rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodeRule {
    pub pattern: &'static str,
    pub exclude: Option<&'static str>,
    pub commission: Commission,
    pub priority: i32,
}

const fn rule(pattern: &'static str, commission: Commission) -> CodeRule {
    CodeRule {
        pattern,
        exclude: None,
        commission,
        priority: 10,
    }
}

/// Club-level rule: outranks plain rules and never applies to the federal `BFM-` variant.
const fn club_rule(pattern: &'static str, commission: Commission) -> CodeRule {
    CodeRule {
        pattern,
        exclude: Some("BFM-%"),
        commission,
        priority: 20,
    }
}

const fn rule_except(
    pattern: &'static str,
    exclude: &'static str,
    commission: Commission,
) -> CodeRule {
    CodeRule {
        pattern,
        exclude: Some(exclude),
        commission,
        priority: 10,
    }
}

use Commission::*;

/// Club rules come in pairs: `BF_-` for the graded forms (`BF1-`, `BF2-`) and `BF-` for the
/// ungraded one. The grade slot is one character, so the activity segment is always the
/// second one.
pub static CERTIFICATION_RULES: &[CodeRule] = &[
    club_rule("BF_-ES-%", Escalade),
    club_rule("BF-ES-%", Escalade),
    // includes ice falls (CG) and big walls (GV)
    club_rule("BF_-AL-%", Alpinisme),
    club_rule("BF-AL-%", Alpinisme),
    club_rule("BF_-CA-%", Canyon),
    club_rule("BF-CA-%", Canyon),
    club_rule("BF_-RA-%", Randonnee),
    club_rule("BF-RA-%", Randonnee),
    club_rule("BF_-SN-SR%", SkiDeRandonnee),
    club_rule("BF-SN-SR%", SkiDeRandonnee),
    club_rule("BF_-SN-SA%", SkiDePiste),
    club_rule("BF-SN-SA%", SkiDePiste),
    club_rule("BF_-SN-RQ%", Raquette),
    club_rule("BF-SN-RQ%", Raquette),
    club_rule("BF_-SN-SW", SnowboardRando),
    club_rule("BF-SN-SW", SnowboardRando),
    club_rule("BF_-SN-SWA%", SnowboardAlpin),
    club_rule("BF-SN-SWA%", SnowboardAlpin),
    rule("BRV-NIVO%", SkiDeRandonnee),
    rule("BRV-UFNA%", SkiDeRandonnee),
    club_rule("BF_-VM-%", Vtt),
    club_rule("BF-VM-%", Vtt),
    // trail certifications also belong to hiking through the RA rules above
    club_rule("BF_-RA-TR%", Trail),
    club_rule("BF-RA-TR%", Trail),
];

pub static TRAINING_RULES: &[CodeRule] = &[
    // climbing: indoor, boulder, natural sites, big walls
    rule("STG-FEA%", Escalade),
    rule("STG-FEB%", Escalade),
    rule("STG-FES%", Escalade),
    rule("STG-UFES%", Escalade),
    rule("STG-RFEA%", Escalade),
    rule("STG-RFES%", Escalade),
    rule("STG-TEST%", Escalade),
    rule("STG-QLGV%", Escalade),
    rule("FOR-CIEA%", Escalade),
    rule("FOR-CIEN%", Escalade),
    rule("FOR-CIES%", Escalade),
    rule("FOR-CIEG%", Escalade),
    rule("FOR-CTEA%", Escalade),
    rule("FOR-CTEN%", Escalade),
    rule("FOR-IIES%", Escalade),
    rule("STG-BFEA%", Escalade),
    rule("STG-BFES%", Escalade),
    // mountaineering, ice falls, adventure terrain
    rule("STG-FAL%", Alpinisme),
    rule("STG-FAM%", Alpinisme),
    rule("STG-FAT%", Alpinisme),
    rule("STG-FCG%", Alpinisme),
    rule("STG-UFALA%", Alpinisme),
    rule("STG-UFCG%", Alpinisme),
    rule("STG-UFGV%", Alpinisme),
    rule("STG-UFTV%", Alpinisme),
    rule("STG-UVAM%", Alpinisme),
    rule("STG-UVAT%", Alpinisme),
    rule("STG-UVCG%", Alpinisme),
    rule("STG-RFAL%", Alpinisme),
    rule("STG-RFAM%", Alpinisme),
    rule("STG-RFAT%", Alpinisme),
    rule("FOR-CIAL%", Alpinisme),
    rule("FOR-CICG%", Alpinisme),
    rule("FOR-CTAL%", Alpinisme),
    rule("FOR-IIAL%", Alpinisme),
    rule("FOR-ITAL%", Alpinisme),
    rule("STG-BFAL%", Alpinisme),
    // canyon; UFCAR is the map-reading unit, not canyoning
    rule("STG-FCA%", Canyon),
    rule_except("STG-UFCA%", "STG-UFCAR%", Canyon),
    rule("STG-UFPA%", Canyon),
    rule("STG-RFCA%", Canyon),
    rule("FOR-CICA%", Canyon),
    // hiking, orientation
    rule("STG-FRA%", Randonnee),
    rule("STG-FRD%", Randonnee),
    rule("STG-FRM%", Randonnee),
    rule("STG-UFRA%", Randonnee),
    rule("STG-UFCO%", Randonnee),
    rule("STG-UFCAR%", Randonnee),
    rule("STG-UFGPS%", Randonnee),
    rule("STG-RFRA%", Randonnee),
    rule("STG-RFRD%", Randonnee),
    rule("STG-RFRM%", Randonnee),
    rule("FOR-CIRM%", Randonnee),
    rule("FOR-CIRA%", Randonnee),
    rule("FOR-CTRM%", Randonnee),
    rule("FOR-CTRA%", Randonnee),
    rule("FOR-IICO%", Randonnee),
    rule("FOR-ITCO%", Randonnee),
    rule("STG-BFRD%", Randonnee),
    rule("STG-UFQO%", Randonnee),
    rule("FOR-CITR%", Trail),
    rule("FOR-CTTR%", Trail),
    rule("STG-FRQ%", Raquette),
    rule("STG-UFSN90%", Raquette),
    rule("STG-RFRQ%", Raquette),
    rule("STG-APTRQ%", Raquette),
    rule("FOR-CIRQ%", Raquette),
    rule("FOR-CTRQ%", Raquette),
    rule("STG-BFRQ%", Raquette),
    // ski touring, ski mountaineering, snow safety
    rule("STG-FSM%", SkiDeRandonnee),
    rule("STG-UFNA%", SkiDeRandonnee),
    rule("STG-UFNS%", SkiDeRandonnee),
    rule("STG-UFSG%", SkiDeRandonnee),
    rule("STG-UFSN60%", SkiDeRandonnee),
    rule("STG-UFSN70%", SkiDeRandonnee),
    rule("STG-SNFST%", SkiDeRandonnee),
    rule("STG-UFFST%", SkiDeRandonnee),
    rule("STG-UFSST%", SkiDeRandonnee),
    rule("STG-RFSM%", SkiDeRandonnee),
    rule("STG-QFSN%", SkiDeRandonnee),
    rule("FOR-CISM%", SkiDeRandonnee),
    rule("FOR-CTSM%", SkiDeRandonnee),
    rule("FOR-IISA%", SkiDeRandonnee),
    rule("FOR-ITSM%", SkiDeRandonnee),
    rule("FOR-IINA%", SkiDeRandonnee),
    rule("FOR-ITNA%", SkiDeRandonnee),
    rule("STG-BFSM%", SkiDeRandonnee),
    rule("STG-QFHM%", SkiDeRandonnee),
    rule("STG-FSA%", SkiDePiste),
    rule("STG-UFSN80%", SkiDePiste),
    rule("STG-FSF%", SkiDeFond),
    rule("STG-FSB%", SnowboardRando),
    rule("STG-FSL%", SnowboardRando),
    rule("STG-FSU%", SnowboardRando),
    rule("STG-UFSB%", SnowboardRando),
    rule("STG-RFSL%", SnowboardRando),
    rule("FOR-CISB%", SnowboardRando),
    rule("FOR-CISL%", SnowboardRando),
    rule("FOR-CTSB%", SnowboardRando),
    rule("FOR-IISL%", SnowboardRando),
    rule("FOR-ITSL%", SnowboardRando),
    rule("STG-FVM%", Vtt),
    rule("STG-RFVM%", Vtt),
    rule("FOR-CIVM%", Vtt),
    rule("FOR-ITVM%", Vtt),
    rule("STG-UFVF%", ViaFerrata),
    rule("STG-QFMN%", MarcheNordique),
    // first aid and cross-activity units
    rule("STG-PSC1%", Formation),
    rule("STG-SNSEC%", Formation),
    rule("STG-UFSE%", Formation),
    rule("STG-UFFG%", Formation),
    rule("STG-FROEPI%", Formation),
    rule("STG-AFTCA%", Formation),
    rule_except("FOR-IIC%", "FOR-IICO%", Formation),
    rule("FOR-CIFC%", Environnement),
    rule("STG-FORDIR%", VieDuClub),
    rule("STG-FORTR%", VieDuClub),
    rule("STG_FCO%", VieDuClub),
];

/// Which rule table a code is classified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeFamily {
    Training,
    Certification,
}

impl CodeFamily {
    pub fn rules(self) -> &'static [CodeRule] {
        match self {
            CodeFamily::Training => TRAINING_RULES,
            CodeFamily::Certification => CERTIFICATION_RULES,
        }
    }

    fn compiled(self) -> &'static [CompiledRule] {
        static TRAINING: OnceLock<Vec<CompiledRule>> = OnceLock::new();
        static CERTIFICATION: OnceLock<Vec<CompiledRule>> = OnceLock::new();
        let cell = match self {
            CodeFamily::Training => &TRAINING,
            CodeFamily::Certification => &CERTIFICATION,
        };
        cell.get_or_init(|| self.rules().iter().map(CompiledRule::new).collect())
    }
}

struct CompiledRule {
    rule: &'static CodeRule,
    pattern: Regex,
    exclude: Option<Regex>,
}

impl CompiledRule {
    fn new(rule: &'static CodeRule) -> Self {
        Self {
            rule,
            pattern: like_regex(rule.pattern),
            exclude: rule.exclude.map(like_regex),
        }
    }

    fn matches(&self, code: &str) -> bool {
        self.pattern.is_match(code)
            && !self
                .exclude
                .as_ref()
                .is_some_and(|exclude| exclude.is_match(code))
    }
}

/// Renders a `LIKE` pattern as an anchored regular expression.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut buf = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

fn like_regex(pattern: &str) -> Regex {
    // Escaped literals plus `.`/`.*` always form a valid expression.
    Regex::new(&format!("(?s){}", like_to_regex(pattern))).unwrap_or_else(|_| {
        unreachable!("LIKE pattern {pattern:?} rendered an invalid regex")
    })
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Rules of `family` that apply to `code`, in declaration order.
pub fn matching_rules(family: CodeFamily, code: &str) -> Vec<&'static CodeRule> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Vec::new();
    }
    family
        .compiled()
        .iter()
        .filter(|compiled| compiled.matches(&code))
        .map(|compiled| compiled.rule)
        .collect()
}

/// Every commission `code` belongs to, deduplicated in first-match order.
pub fn classify_code(family: CodeFamily, code: &str) -> Vec<Commission> {
    let mut commissions = Vec::new();
    for rule in matching_rules(family, code) {
        if !commissions.contains(&rule.commission) {
            commissions.push(rule.commission);
        }
    }
    commissions
}

pub fn commissions_for_certification(code: &str) -> Vec<Commission> {
    classify_code(CodeFamily::Certification, code)
}

pub fn commissions_for_training(code: &str) -> Vec<Commission> {
    classify_code(CodeFamily::Training, code)
}

const SNOW_SPORTS: &str = "SPORTS DE NEIGE";

static ACTIVITIES: &[(&str, Commission)] = &[
    ("ESCALADE", Escalade),
    ("ALPINISME", Alpinisme),
    ("DESCENTE DE CANYON", Canyon),
    ("RANDONNEE", Randonnee),
    ("VELO DE MONTAGNE", Vtt),
];

static SNOW_DISCIPLINES: &[(&str, Commission)] = &[
    ("randonnée", SkiDeRandonnee),
    ("raquettes", Raquette),
    ("piste", SkiDePiste),
    ("fond", SkiDeFond),
    ("snowboard", SnowboardRando),
    ("nordique", SkiRandonneeNordique),
];

/// Commission for an activity name. Snow sports are split by discipline and fall back to
/// ski touring when the discipline is missing or unknown.
pub fn commission_for_activity(activity: &str, discipline: Option<&str>) -> Option<Commission> {
    let activity = activity.trim().to_uppercase();
    if activity.is_empty() {
        return None;
    }
    if activity == SNOW_SPORTS {
        let discipline = discipline.map(|d| d.trim().to_lowercase()).unwrap_or_default();
        let found = SNOW_DISCIPLINES
            .iter()
            .find(|(key, _)| !discipline.is_empty() && discipline.contains(key))
            .map(|(_, commission)| *commission);
        return Some(found.unwrap_or(SkiDeRandonnee));
    }
    ACTIVITIES
        .iter()
        .find(|(name, _)| *name == activity)
        .map(|(_, commission)| *commission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certification_codes_map_by_activity_segment() {
        assert_eq!(commissions_for_certification("BF1-ES-001"), vec![Escalade]);
        assert_eq!(commissions_for_certification("bf2-al-cg"), vec![Alpinisme]);
        assert_eq!(commissions_for_certification("BF1-CA-TEST"), vec![Canyon]);
        assert_eq!(commissions_for_certification("BF1-SN-SR"), vec![SkiDeRandonnee]);
        assert_eq!(commissions_for_certification("BF1-SN-SA"), vec![SkiDePiste]);
        assert_eq!(commissions_for_certification("BF1-SN-RQ"), vec![Raquette]);
        assert_eq!(commissions_for_certification("BF1-SN-SW"), vec![SnowboardRando]);
        assert_eq!(commissions_for_certification("BF1-SN-SWA"), vec![SnowboardAlpin]);
        assert_eq!(commissions_for_certification("BRV-NIVO1"), vec![SkiDeRandonnee]);
        assert_eq!(commissions_for_certification("BF2-VM-TEST"), vec![Vtt]);
    }

    #[test]
    fn trail_certification_is_multi_label_in_first_match_order() {
        assert_eq!(
            commissions_for_certification("BF1-RA-TR"),
            vec![Randonnee, Trail]
        );
    }

    #[test]
    fn activity_segment_is_the_one_after_the_grade() {
        assert_eq!(commissions_for_certification("BF1-AL-ES-X"), vec![Alpinisme]);
        assert_eq!(commissions_for_certification("BF-AL-ES-X"), vec![Alpinisme]);
        assert_eq!(commissions_for_certification("BF-CA-01"), vec![Canyon]);
        assert!(commissions_for_certification("BF12-ES-01").is_empty());
        assert!(commissions_for_certification("BF1-XX-ES-01").is_empty());
    }

    #[test]
    fn federal_variant_is_excluded_from_club_rules() {
        assert!(commissions_for_certification("BFM-ES-01").is_empty());
        assert_eq!(commissions_for_certification("BF1-ES-01"), vec![Escalade]);
    }

    #[test]
    fn exclusion_only_vetoes_its_own_rule() {
        // canyon rule excludes UFCAR, the hiking rule still claims it
        assert_eq!(commissions_for_training("STG-UFCAR1"), vec![Randonnee]);
        assert_eq!(commissions_for_training("STG-UFCA01"), vec![Canyon]);
        assert_eq!(commissions_for_training("FOR-IICO"), vec![Randonnee]);
        assert_eq!(commissions_for_training("FOR-IIC1"), vec![Formation]);
    }

    #[test]
    fn transversal_and_empty_codes_have_no_commission() {
        assert!(commissions_for_certification("PSC1").is_empty());
        assert!(commissions_for_certification("UNKNOWN-CODE").is_empty());
        assert!(commissions_for_certification("").is_empty());
        assert!(commissions_for_training("   ").is_empty());
    }

    #[test]
    fn training_codes_cover_fine_grained_prefixes() {
        assert_eq!(commissions_for_training("STG-FEA10"), vec![Escalade]);
        assert_eq!(commissions_for_training("stg-fcg20"), vec![Alpinisme]);
        assert_eq!(commissions_for_training("STG-UFSN80"), vec![SkiDePiste]);
        assert_eq!(commissions_for_training("STG-UFSN90"), vec![Raquette]);
        assert_eq!(commissions_for_training("FOR-CIFC01"), vec![Environnement]);
        assert_eq!(commissions_for_training("STG-FORDIR"), vec![VieDuClub]);
        assert_eq!(commissions_for_training("STG-FCO-2"), vec![VieDuClub]);
        assert_eq!(commissions_for_training("STG-UFSEC"), vec![Formation]);
    }

    #[test]
    fn classification_is_deterministic() {
        for code in ["BF1-RA-TR", "STG-UFCAR1", "STG-FEA10", "BRV-NIVO", "PSC1"] {
            let first = commissions_for_certification(code);
            assert_eq!(first, commissions_for_certification(code));
            let first = commissions_for_training(code);
            assert_eq!(first, commissions_for_training(code));
        }
    }

    #[test]
    fn like_rendering_escapes_literals() {
        assert_eq!(like_to_regex("BF%-ES-%"), "^BF.*\\-ES\\-.*$");
        assert_eq!(like_to_regex("STG_FCO%"), "^STG.FCO.*$");
        assert_eq!(like_to_regex("A.B"), "^A\\.B$");
    }

    #[test]
    fn activities_map_directly() {
        assert_eq!(commission_for_activity("ESCALADE", None), Some(Escalade));
        assert_eq!(commission_for_activity(" escalade ", None), Some(Escalade));
        assert_eq!(commission_for_activity("DESCENTE DE CANYON", None), Some(Canyon));
        assert_eq!(commission_for_activity("SPELEOLOGIE", None), None);
        assert_eq!(commission_for_activity("", None), None);
    }

    #[test]
    fn snow_sports_resolve_by_discipline_with_fallback() {
        let act = "SPORTS DE NEIGE";
        assert_eq!(commission_for_activity(act, Some("Randonnée")), Some(SkiDeRandonnee));
        assert_eq!(commission_for_activity(act, Some("Raquettes")), Some(Raquette));
        assert_eq!(commission_for_activity(act, Some("Ski de Piste")), Some(SkiDePiste));
        assert_eq!(commission_for_activity(act, Some("Fond")), Some(SkiDeFond));
        assert_eq!(commission_for_activity(act, Some("Snowboard")), Some(SnowboardRando));
        assert_eq!(commission_for_activity(act, Some("Nordique")), Some(SkiRandonneeNordique));
        assert_eq!(commission_for_activity(act, Some("Luge")), Some(SkiDeRandonnee));
        assert_eq!(commission_for_activity(act, None), Some(SkiDeRandonnee));
    }

    #[test]
    fn slugs_round_trip_and_dev_ids_are_dense() {
        for (i, commission) in Commission::ALL.into_iter().enumerate() {
            assert_eq!(Commission::from_slug(commission.slug()), Some(commission));
            assert_eq!(commission.dev_id(), i as i64 + 1);
        }
    }

    #[test]
    fn every_rule_pattern_compiles() {
        assert_eq!(
            CodeFamily::Training.compiled().len(),
            TRAINING_RULES.len()
        );
        assert_eq!(
            CodeFamily::Certification.compiled().len(),
            CERTIFICATION_RULES.len()
        );
    }
}
