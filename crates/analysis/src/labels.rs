//! Pull request label classification.
//!
//! Two label families are derived for every pull request:
//!
//! * **refined** labels come from GitHub labels alone, by case-insensitive
//!   substring match against [`REFINED_RULES`];
//! * **custom** labels add title heuristics that depend on the
//!   specification type on top of the refined labels.
//!
//! Both are multi-label and never empty: they fall back to
//! [`UNLABELED`] and [`MISC`] respectively.

use std::collections::{BTreeSet, HashSet};

use common::SpecType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNLABELED: &str = "Unlabeled";
pub const MISC: &str = "Misc";

macro_rules! lazy_regex {
    ($name:ident = $pattern:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($pattern).expect("invalid regex"));
    };
}

/// (any of these substrings, category). A label may hit several rows.
pub const REFINED_RULES: &[(&[&str], &str)] = &[
    (&["a-review", "author review"], "Author Review"),
    (&["e-review", "editor review"], "Editor Review"),
    (&["discuss"], "Discuss"),
    (&["on-hold", "on hold"], "On Hold"),
    (&["final-call", "final call"], "Final Call"),
    (&["draft"], "Draft"),
    (&["review"], "Review"),
    (&["last-call", "last call"], "Last Call"),
    (&["final"], "Final"),
    (&["stagnant"], "Stagnant"),
    (&["withdrawn"], "Withdrawn"),
    (&["c-new"], "New"),
    (&["c-update"], "Update"),
    (&["c-status"], "Status Change"),
    (&["created-by-bot", "bot"], "Created By Bot"),
    (&["core"], "Core"),
    (&["networking"], "Networking"),
    (&["interface"], "Interface"),
    (&["erc"], "ERC"),
    (&["meta"], "Meta"),
    (&["informational"], "Informational"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub refined_labels: BTreeSet<String>,
    pub custom_labels: BTreeSet<String>,
}

pub fn classify(title: &str, raw_labels: &[String], spec_type: SpecType) -> Classification {
    Classification {
        refined_labels: classify_refined(raw_labels),
        custom_labels: classify_custom(title, raw_labels, spec_type),
    }
}

pub fn classify_refined(raw_labels: &[String]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for label in raw_labels {
        let lowered = label.to_lowercase();
        for (patterns, category) in REFINED_RULES {
            if patterns.iter().any(|p| lowered.contains(p)) {
                out.insert((*category).to_string());
            }
        }
    }
    if out.is_empty() {
        out.insert(UNLABELED.to_string());
    }
    out
}

pub fn classify_custom(title: &str, raw_labels: &[String], spec_type: SpecType) -> BTreeSet<String> {
    let mut out = BTreeSet::new();

    let refined = classify_refined(raw_labels);
    if !(refined.len() == 1 && refined.contains(UNLABELED)) {
        out.extend(refined);
    }

    let input = RuleInput { title, raw_labels };
    out.extend(apply_title_rules(title_rules(spec_type), &input));

    if out.is_empty() {
        out.insert(MISC.to_string());
    }
    out
}

struct RuleInput<'a> {
    title: &'a str,
    raw_labels: &'a [String],
}

impl RuleInput<'_> {
    fn has_label(&self, name: &str) -> bool {
        self.raw_labels.iter().any(|l| l.eq_ignore_ascii_case(name))
    }
}

enum Check {
    /// Case-sensitive title prefix.
    TitlePrefix(String),
    TitleMatches(&'static Lazy<Regex>),
    HasLabel(&'static str),
}

impl Check {
    fn holds(&self, input: &RuleInput<'_>) -> bool {
        match self {
            Check::TitlePrefix(prefix) => input.title.starts_with(prefix.as_str()),
            Check::TitleMatches(re) => re.is_match(input.title),
            Check::HasLabel(name) => input.has_label(name),
        }
    }
}

/// A title heuristic. Fires when every check holds and no earlier rule has
/// suppressed its label; once fired, its `suppresses` labels are skipped by
/// every later rule.
struct TitleRule {
    label: String,
    checks: Vec<Check>,
    suppresses: Vec<String>,
}

impl TitleRule {
    fn new(label: impl Into<String>, checks: Vec<Check>) -> Self {
        Self {
            label: label.into(),
            checks,
            suppresses: Vec::new(),
        }
    }

    fn suppressing(mut self, labels: &[&str]) -> Self {
        self.suppresses = labels.iter().map(|l| l.to_string()).collect();
        self
    }
}

fn apply_title_rules(rules: &[TitleRule], input: &RuleInput<'_>) -> Vec<String> {
    let mut fired = Vec::new();
    let mut suppressed: HashSet<&str> = HashSet::new();
    for rule in rules {
        if suppressed.contains(rule.label.as_str()) {
            continue;
        }
        if rule.checks.iter().all(|check| check.holds(input)) {
            fired.push(rule.label.clone());
            suppressed.extend(rule.suppresses.iter().map(String::as_str));
        }
    }
    fired
}

lazy_regex!(TYPO_RE = r"(?i)typo|spelling|grammar|punctuation");
lazy_regex!(STATUS_CHANGE_RE = r"(?i)move to|status.*change|change.*status");
lazy_regex!(RIP_TYPO_RE = r"(?i)typo|filename|grammar|punctuation");
lazy_regex!(RIP_UPDATE_RE = r"(?i)update rip-|rename|review required|remove deprecated");
lazy_regex!(RIP_NEW_RE = r"(?i)^(create rip|add rip)");

/// EIP and ERC share one rule shape; only the document noun differs.
fn proposal_rules(noun: &str) -> Vec<TitleRule> {
    let update_prefix = format!("Update {noun}-");
    let generic_update = format!("{noun} Update");
    vec![
        TitleRule::new(
            "Typo Fix",
            vec![
                Check::TitlePrefix(update_prefix.clone()),
                Check::TitleMatches(&TYPO_RE),
            ],
        )
        .suppressing(&["Status Change", generic_update.as_str()]),
        TitleRule::new(
            "Status Change",
            vec![
                Check::TitlePrefix(update_prefix.clone()),
                Check::TitleMatches(&STATUS_CHANGE_RE),
            ],
        )
        .suppressing(&[generic_update.as_str()]),
        TitleRule::new(
            generic_update.clone(),
            vec![Check::TitlePrefix(update_prefix)],
        ),
        TitleRule::new("Created By Bot", vec![Check::HasLabel("created-by-bot")]),
        TitleRule::new(
            format!("New {noun}"),
            vec![
                Check::TitlePrefix(format!("Add {noun}")),
                Check::HasLabel("c-new"),
            ],
        ),
    ]
}

fn rip_rules() -> Vec<TitleRule> {
    vec![
        TitleRule::new("Typo Fix", vec![Check::TitleMatches(&RIP_TYPO_RE)]),
        TitleRule::new("Update", vec![Check::TitleMatches(&RIP_UPDATE_RE)]),
        TitleRule::new("New RIP", vec![Check::TitleMatches(&RIP_NEW_RE)]),
    ]
}

static EIP_RULES: Lazy<Vec<TitleRule>> = Lazy::new(|| proposal_rules("EIP"));
static ERC_RULES: Lazy<Vec<TitleRule>> = Lazy::new(|| proposal_rules("ERC"));
static RIP_RULES: Lazy<Vec<TitleRule>> = Lazy::new(rip_rules);

fn title_rules(spec_type: SpecType) -> &'static [TitleRule] {
    match spec_type {
        SpecType::Eip => &EIP_RULES,
        SpecType::Erc => &ERC_RULES,
        SpecType::Rip => &RIP_RULES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn refined_falls_back_to_unlabeled() {
        assert_eq!(classify_refined(&[]), set(&[UNLABELED]));
        assert_eq!(classify_refined(&labels(&["dependencies"])), set(&[UNLABELED]));
    }

    #[test]
    fn refined_is_multi_label_and_case_insensitive() {
        let out = classify_refined(&labels(&["w-A-Review"]));
        assert_eq!(out, set(&["Author Review", "Review"]));

        let out = classify_refined(&labels(&["c-update", "t-core", "e-review"]));
        assert_eq!(out, set(&["Update", "Core", "Editor Review", "Review"]));
    }

    #[test]
    fn final_call_also_counts_as_final() {
        let out = classify_refined(&labels(&["Final Call"]));
        assert_eq!(out, set(&["Final Call", "Final"]));
    }

    #[test]
    fn bot_substring_is_created_by_bot() {
        let out = classify_refined(&labels(&["bot-opened"]));
        assert_eq!(out, set(&["Created By Bot"]));
    }

    #[test]
    fn typo_fix_suppresses_generic_update() {
        let out = classify_custom(
            "Update EIP-1559: Fix typo in specification",
            &labels(&["c-update"]),
            SpecType::Eip,
        );
        assert_eq!(out, set(&["Update", "Typo Fix"]));
    }

    #[test]
    fn status_change_suppresses_generic_update() {
        let out = classify_custom("Update EIP-4844: Move to Last Call", &[], SpecType::Eip);
        assert_eq!(out, set(&["Status Change"]));
    }

    #[test]
    fn typo_beats_status_change() {
        let out = classify_custom(
            "Update EIP-20: fix typo and move to Final",
            &[],
            SpecType::Eip,
        );
        assert_eq!(out, set(&["Typo Fix"]));
    }

    #[test]
    fn plain_update_gets_generic_label() {
        let out = classify_custom("Update EIP-7702: clarify nonce rules", &[], SpecType::Eip);
        assert_eq!(out, set(&["EIP Update"]));
    }

    #[test]
    fn update_prefix_is_case_sensitive() {
        let out = classify_custom("update eip-7702: clarify", &[], SpecType::Eip);
        assert_eq!(out, set(&[MISC]));
    }

    #[test]
    fn new_eip_requires_title_and_label() {
        let out = classify_custom(
            "Add EIP: New gas metering proposal",
            &labels(&["c-new"]),
            SpecType::Eip,
        );
        assert_eq!(out, set(&["New", "New EIP"]));

        let out = classify_custom("Add EIP: New gas metering proposal", &[], SpecType::Eip);
        assert_eq!(out, set(&[MISC]));
    }

    #[test]
    fn erc_rules_use_erc_prefix() {
        let out = classify_custom("Update ERC-721: spelling", &[], SpecType::Erc);
        assert_eq!(out, set(&["Typo Fix"]));

        let out = classify_custom("Update EIP-721: tweak", &[], SpecType::Erc);
        assert_eq!(out, set(&[MISC]));

        let out = classify_custom(
            "Add ERC: token bound accounts",
            &labels(&["c-new", "created-by-bot"]),
            SpecType::Erc,
        );
        assert_eq!(out, set(&["New", "Created By Bot", "New ERC"]));
    }

    #[test]
    fn rip_rules_fire_independently() {
        let out = classify_custom("Create RIP-7212 precompile", &[], SpecType::Rip);
        assert_eq!(out, set(&["New RIP"]));

        let out = classify_custom("Update RIP-7560: fix grammar", &[], SpecType::Rip);
        assert_eq!(out, set(&["Typo Fix", "Update"]));

        let out = classify_custom("Remove deprecated section", &[], SpecType::Rip);
        assert_eq!(out, set(&["Update"]));

        let out = classify_custom("Proposal: add rip for L2 fees", &[], SpecType::Rip);
        assert_eq!(out, set(&[MISC]));
    }

    #[test]
    fn custom_falls_back_to_misc_only_when_nothing_fires() {
        assert_eq!(classify_custom("Hello", &[], SpecType::Eip), set(&[MISC]));
        assert_eq!(
            classify_custom("Hello", &labels(&["s-draft"]), SpecType::Eip),
            set(&["Draft"])
        );
    }

    #[test]
    fn classify_combines_both_families() {
        let result = classify("Update EIP-1: x", &labels(&["c-update"]), SpecType::Eip);
        assert_eq!(result.refined_labels, set(&["Update"]));
        assert_eq!(result.custom_labels, set(&["Update", "EIP Update"]));
    }
}
