//! Canonical section identity: the eleven required final-report sections, their titles,
//! declared aliases (including the Chinese aliases carried over from the source deployment),
//! and the id-normalization algorithm shared by the legacy markdown parser and the
//! section-mode write path.

/// One required section, in the fixed order the assembled report emits them.
pub struct SectionSpec {
    pub id: &'static str,
    pub title: &'static str,
    pub aliases: &'static [&'static str],
}

pub const REQUIRED_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        id: "summary",
        title: "Summary",
        aliases: &["summary", "摘要", "总结"],
    },
    SectionSpec {
        id: "strengths",
        title: "Strengths",
        aliases: &["strengths", "优点", "优势"],
    },
    SectionSpec {
        id: "weaknesses",
        title: "Weaknesses",
        aliases: &["weaknesses", "缺点", "问题"],
    },
    SectionSpec {
        id: "key_issues",
        title: "Key Issues",
        aliases: &["key issues", "核心问题", "关键问题"],
    },
    SectionSpec {
        id: "actionable_suggestions",
        title: "Actionable Suggestions",
        aliases: &["actionable suggestions", "建议", "可执行建议"],
    },
    SectionSpec {
        id: "storyline_options_writing_outlines",
        title: "Storyline Options + Writing Outlines",
        aliases: &["storyline options", "writing outlines", "叙事方案", "写作提纲"],
    },
    SectionSpec {
        id: "priority_revision_plan",
        title: "Priority Revision Plan",
        aliases: &["priority revision plan", "修订计划", "优先级修订计划"],
    },
    SectionSpec {
        id: "experiment_inventory_research_experiment_plan",
        title: "Experiment Inventory & Research Experiment Plan",
        aliases: &[
            "experiment inventory",
            "research experiment plan",
            "实验清单",
            "研究实验计划",
        ],
    },
    SectionSpec {
        id: "novelty_verification_related_work_matrix",
        title: "Novelty Verification & Related-Work Matrix",
        aliases: &[
            "novelty verification",
            "related-work matrix",
            "新颖性验证",
            "相关工作矩阵",
        ],
    },
    SectionSpec {
        id: "references",
        title: "References",
        aliases: &["references", "reference", "参考文献"],
    },
    SectionSpec {
        id: "scores",
        title: "Scores",
        aliases: &["scores", "final score", "评分", "最终评分"],
    },
];

pub fn section_spec(id: &str) -> Option<&'static SectionSpec> {
    REQUIRED_SECTIONS.iter().find(|spec| spec.id == id)
}

/// Canonical normalization used to match a caller-supplied `section_id`/`section_title`, or a
/// markdown heading, against a required section: lowercase; `&` -> ` and `; `+`, `/`, `\`,
/// `_`, `-` -> space; non-alphanumerics stripped; whitespace collapsed.
pub fn canonicalize(token: &str) -> String {
    let lowered = token.to_lowercase().replace('&', " and ");
    let spaced: String = lowered
        .chars()
        .map(|c| match c {
            '+' | '/' | '\\' | '_' | '-' => ' ',
            other => other,
        })
        .collect();
    let stripped: String = spaced
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves a free-form token (an explicit `section_id`, a `section_title`, or a markdown
/// heading) to a required section id. Matches canonical section ids and titles first, then
/// declared aliases exactly, then falls back to substring containment against any alias —
/// preserved intentionally, including its first-match-wins ambiguity on composite headings
/// (see the open question in the design notes).
pub fn normalize_section_id(token: &str) -> Option<&'static str> {
    let canonical = canonicalize(token);
    if canonical.is_empty() {
        return None;
    }

    for spec in REQUIRED_SECTIONS {
        if canonicalize(spec.id) == canonical || canonicalize(spec.title) == canonical {
            return Some(spec.id);
        }
    }
    for spec in REQUIRED_SECTIONS {
        if spec.aliases.iter().any(|alias| canonicalize(alias) == canonical) {
            return Some(spec.id);
        }
    }
    for spec in REQUIRED_SECTIONS {
        if spec
            .aliases
            .iter()
            .any(|alias| canonical.contains(&canonicalize(alias)))
        {
            return Some(spec.id);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_punctuation_and_case() {
        assert_eq!(canonicalize("Experiment Inventory & Research-Plan"), "experiment inventory and research plan");
    }

    #[test]
    fn matches_declared_alias_exactly() {
        assert_eq!(normalize_section_id("优点"), Some("strengths"));
    }

    #[test]
    fn composite_heading_matches_first_contained_alias() {
        // Regression pin for the preserved ambiguity: "strengths" is tried before
        // "weaknesses" in REQUIRED_SECTIONS order, so a composite heading resolves to it.
        assert_eq!(normalize_section_id("Strengths and Weaknesses"), Some("strengths"));
    }

    #[test]
    fn rejects_unrelated_text() {
        assert_eq!(normalize_section_id("random heading"), None);
    }
}
