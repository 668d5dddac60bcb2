//! Validation rule tokens and rule-map composition.
//!
//! Rules are string tokens in the `name[:arg,arg]` form (`required`,
//! `min:3`, `in:draft,published`). Callers may declare them as token
//! lists or as one `|`-separated string; the `regex:` token keeps its
//! whole argument verbatim, so patterns containing `,` must use the
//! list form when they also contain `|`.

use std::fmt;

use indexmap::IndexMap;

use crate::field::{FieldKind, RelationKind};
use crate::schema::Schema;

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// One parsed validation rule token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub name: String,
    pub args: Vec<String>,
}

impl Rule {
    /// Parse a single token. The part before the first `:` is the rule
    /// name; the remainder is split on `,` — except for `regex`, whose
    /// pattern is kept whole.
    pub fn parse(token: &str) -> Self {
        match token.trim().split_once(':') {
            Some((name, rest)) => {
                let args = if name == "regex" {
                    vec![rest.to_string()]
                } else {
                    rest.split(',').map(|a| a.trim().to_string()).collect()
                };
                Self {
                    name: name.to_string(),
                    args,
                }
            }
            None => Self {
                name: token.trim().to_string(),
                args: Vec::new(),
            },
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// The token form, e.g. `min:3`.
    pub fn token(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.args.join(","))
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// An ordered list of rules, as accepted at declaration sites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet(pub Vec<Rule>);

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.0
    }
}

impl From<&str> for RuleSet {
    /// `"required|min:3"` — tokens separated by `|`.
    fn from(s: &str) -> Self {
        Self(
            s.split('|')
                .filter(|t| !t.trim().is_empty())
                .map(Rule::parse)
                .collect(),
        )
    }
}

impl From<String> for RuleSet {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Vec<&str>> for RuleSet {
    fn from(tokens: Vec<&str>) -> Self {
        Self(tokens.into_iter().map(Rule::parse).collect())
    }
}

impl From<Vec<String>> for RuleSet {
    fn from(tokens: Vec<String>) -> Self {
        Self(tokens.iter().map(|t| Rule::parse(t)).collect())
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// A composed rule map: dotted field path to ordered rules.
pub type RuleMap = IndexMap<String, Vec<Rule>>;

/// Build a caller-side base rule map from `(path, rules)` pairs.
pub fn rule_map<P, R>(pairs: impl IntoIterator<Item = (P, R)>) -> RuleMap
where
    P: Into<String>,
    R: Into<RuleSet>,
{
    pairs
        .into_iter()
        .map(|(p, r)| (p.into(), r.into().into_rules()))
        .collect()
}

/// Merge per-field rules into a caller-declared base rule map.
///
/// For every scalar field that participates in persistence, the field's
/// rules are unioned into the base set at its path (duplicates removed,
/// base order preserved). Relation fields expand each child under
/// `rel.*.child` (to-many) or `rel.child` (to-one); a child declared
/// `exists = false` instead removes any caller-declared rule at its
/// expanded path. Paths whose final rule list is empty are dropped.
///
/// The base map must already be the mode-appropriate one — create and
/// update rule sets are never mixed.
pub fn compose_rules(base: &RuleMap, fields: &Schema) -> RuleMap {
    let mut rules = base.clone();

    for (key, field) in fields {
        match field {
            FieldKind::Scalar(f) => {
                if !f.exists {
                    continue;
                }
                merge_into(&mut rules, key, &f.rules);
            }
            FieldKind::Relation(r) => {
                if !r.exists {
                    continue;
                }
                for (child_key, child) in &r.fields {
                    let rule_key = match r.relation.kind {
                        RelationKind::ToMany => format!("{key}.*.{child_key}"),
                        RelationKind::ToOne => format!("{key}.{child_key}"),
                    };
                    if !child.exists {
                        rules.shift_remove(&rule_key);
                        continue;
                    }
                    merge_into(&mut rules, &rule_key, &child.rules);
                }
            }
        }
    }

    rules.retain(|_, list| !list.is_empty());
    rules
}

fn merge_into(rules: &mut RuleMap, key: &str, field_rules: &[Rule]) {
    let entry = rules.entry(key.to_string()).or_default();
    for rule in field_rules {
        if !entry.contains(rule) {
            entry.push(rule.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldDescriptor, InputKind, RelationDef, RelationFieldDescriptor};
    use indexmap::indexmap;

    fn scalar(name: &str, rules: &str, exists: bool) -> FieldKind {
        let rules: RuleSet = rules.into();
        let required = rules.0.iter().any(|r| r.name == "required");
        FieldKind::Scalar(FieldDescriptor {
            name: name.to_string(),
            label: None,
            input: InputKind::Text,
            exists,
            disabled: false,
            rules: rules.into_rules(),
            required,
            default_value: None,
            upload: None,
            submit_value: None,
            render_value: None,
        })
    }

    fn relation(name: &str, kind: RelationKind, children: Vec<(&str, &str, bool)>) -> FieldKind {
        let fields = children
            .into_iter()
            .map(|(child, rules, exists)| {
                let FieldKind::Scalar(f) = scalar(child, rules, exists) else {
                    unreachable!()
                };
                (child.to_string(), f)
            })
            .collect();
        FieldKind::Relation(RelationFieldDescriptor {
            name: name.to_string(),
            label: None,
            exists: true,
            relation: RelationDef {
                kind,
                related: format!("{name}_rows"),
                foreign_key: "parent_id".to_string(),
            },
            fields,
            existing_rows: Vec::new(),
        })
    }

    // -- Rule parsing -------------------------------------------------------

    #[test]
    fn parse_bare_token() {
        let rule = Rule::parse("required");
        assert_eq!(rule.name, "required");
        assert!(rule.args.is_empty());
    }

    #[test]
    fn parse_token_with_args() {
        let rule = Rule::parse("in:draft,published");
        assert_eq!(rule.name, "in");
        assert_eq!(rule.args, vec!["draft", "published"]);
        assert_eq!(rule.token(), "in:draft,published");
    }

    #[test]
    fn parse_regex_keeps_argument_whole() {
        let rule = Rule::parse("regex:^[a-z]{2,8}$");
        assert_eq!(rule.name, "regex");
        assert_eq!(rule.args, vec!["^[a-z]{2,8}$"]);
    }

    #[test]
    fn pipe_string_splits_into_tokens() {
        let set: RuleSet = "required|min:3|max:10".into();
        let tokens: Vec<String> = set.0.iter().map(Rule::token).collect();
        assert_eq!(tokens, vec!["required", "min:3", "max:10"]);
    }

    #[test]
    fn token_list_parses_each_entry() {
        let set: RuleSet = vec!["required", "min:3"].into();
        assert_eq!(set.0.len(), 2);
        assert_eq!(set.0[1].arg(0), Some("3"));
    }

    // -- compose_rules ------------------------------------------------------

    #[test]
    fn field_rules_merge_with_base_rules_deduplicated() {
        let base = rule_map([("title", "max:10|required")]);
        let fields = indexmap! {
            "title".to_string() => scalar("title", "required|min:3", true),
        };
        let composed = compose_rules(&base, &fields);
        let tokens: Vec<String> = composed["title"].iter().map(Rule::token).collect();
        assert_eq!(tokens, vec!["max:10", "required", "min:3"]);
    }

    #[test]
    fn field_without_base_rules_stands_alone() {
        let base = RuleMap::new();
        let fields = indexmap! {
            "title".to_string() => scalar("title", "required", true),
        };
        let composed = compose_rules(&base, &fields);
        assert_eq!(composed["title"], vec![Rule::named("required")]);
    }

    #[test]
    fn non_exists_scalar_keeps_base_rules_untouched() {
        let base = rule_map([("slug", "max:64")]);
        let fields = indexmap! {
            "slug".to_string() => scalar("slug", "required", false),
        };
        let composed = compose_rules(&base, &fields);
        let tokens: Vec<String> = composed["slug"].iter().map(Rule::token).collect();
        assert_eq!(tokens, vec!["max:64"]);
    }

    #[test]
    fn to_many_child_rules_expand_with_wildcard() {
        let base = RuleMap::new();
        let fields = indexmap! {
            "photos".to_string() =>
                relation("photos", RelationKind::ToMany, vec![("caption", "required", true)]),
        };
        let composed = compose_rules(&base, &fields);
        assert_eq!(composed["photos.*.caption"], vec![Rule::named("required")]);
    }

    #[test]
    fn to_one_child_rules_expand_without_wildcard() {
        let base = RuleMap::new();
        let fields = indexmap! {
            "profile".to_string() =>
                relation("profile", RelationKind::ToOne, vec![("bio", "required", true)]),
        };
        let composed = compose_rules(&base, &fields);
        assert_eq!(composed["profile.bio"], vec![Rule::named("required")]);
        assert!(!composed.contains_key("profile.*.bio"));
    }

    #[test]
    fn non_exists_child_removes_caller_rule() {
        let base = rule_map([("photos.*.caption", "required")]);
        let fields = indexmap! {
            "photos".to_string() =>
                relation("photos", RelationKind::ToMany, vec![("caption", "min:3", false)]),
        };
        let composed = compose_rules(&base, &fields);
        assert!(!composed.contains_key("photos.*.caption"));
    }

    #[test]
    fn empty_rule_lists_are_omitted() {
        let base = RuleMap::new();
        let fields = indexmap! {
            "notes".to_string() => scalar("notes", "", true),
        };
        let composed = compose_rules(&base, &fields);
        assert!(composed.is_empty());
    }
}
