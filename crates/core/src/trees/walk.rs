//! Answer-by-answer traversal of static and generated trees.
//!
//! A session records the chosen options and turns them into [`ProductFilter`]s that narrow the
//! category before ranking. "Any" style options contribute no filter.

use thiserror::Error;

use crate::domain::product::Product;
use crate::domain::tree::{
    apply_filters, DecisionTree, GeneratedQuestion, GeneratedTree, ProductFilter, TreeNode,
    TreeOption,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalkError {
    #[error("tree `{0}` has no root node")]
    MissingRoot(String),
    #[error("node `{0}` does not exist")]
    MissingNode(String),
    #[error("the tree walk is already finished")]
    Finished,
    #[error("`{answer}` is not an option of question `{question_id}`")]
    UnknownOption { question_id: String, answer: String },
}

/// Where a static walk currently stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalkStep<'a> {
    Question { id: &'a str, text: &'a str, options: &'a [TreeOption] },
    Recommendation { text: &'a str, max_results: usize },
}

impl<'a> WalkStep<'a> {
    fn of(node: &'a TreeNode) -> Self {
        match node {
            TreeNode::Question { id, text, options } => Self::Question { id, text, options },
            TreeNode::Recommendation { text, max_results, .. } => {
                Self::Recommendation { text, max_results: *max_results }
            }
        }
    }
}

pub struct TreeSession<'a> {
    tree: &'a DecisionTree,
    current: &'a TreeNode,
    answers: Vec<(String, String)>,
    filters: Vec<ProductFilter>,
}

impl<'a> TreeSession<'a> {
    pub fn start(tree: &'a DecisionTree) -> Result<Self, WalkError> {
        let current = tree.root().ok_or_else(|| WalkError::MissingRoot(tree.id.clone()))?;
        Ok(Self { tree, current, answers: Vec::new(), filters: Vec::new() })
    }

    pub fn step(&self) -> WalkStep<'a> {
        WalkStep::of(self.current)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.current, TreeNode::Recommendation { .. })
    }

    /// Accepts an option by value or label (case-insensitive) and moves to the next node.
    /// Options without a `next_node_id` lead to the first recommendation node.
    pub fn answer(&mut self, answer: &str) -> Result<WalkStep<'a>, WalkError> {
        let current = self.current;
        let TreeNode::Question { id, options, .. } = current else {
            return Err(WalkError::Finished);
        };
        let wanted = answer.trim();
        let chosen = options
            .iter()
            .find(|option| {
                option.value.eq_ignore_ascii_case(wanted) || option.label.eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| WalkError::UnknownOption {
                question_id: id.clone(),
                answer: wanted.to_string(),
            })?;

        let next = match &chosen.next_node_id {
            Some(next_id) => {
                self.tree.node(next_id).ok_or_else(|| WalkError::MissingNode(next_id.clone()))?
            }
            None => self
                .tree
                .nodes
                .iter()
                .find(|node| matches!(node, TreeNode::Recommendation { .. }))
                .ok_or_else(|| WalkError::MissingNode("recommendation".to_string()))?,
        };

        self.answers.push((id.clone(), chosen.value.clone()));
        if let Some(filter) = chosen.filter_value.as_deref().and_then(ProductFilter::parse) {
            self.filters.push(filter);
        }
        self.current = next;
        Ok(self.step())
    }

    pub fn answers(&self) -> &[(String, String)] {
        &self.answers
    }

    pub fn filters(&self) -> &[ProductFilter] {
        &self.filters
    }

    pub fn max_results(&self) -> Option<usize> {
        match self.current {
            TreeNode::Recommendation { max_results, .. } => Some(*max_results),
            TreeNode::Question { .. } => None,
        }
    }

    pub fn recommend(&self, products: &[Product]) -> Vec<Product> {
        apply_filters(products, &self.filters)
    }
}

/// Walks a generated tree's questions in order.
pub struct GeneratedTreeSession<'a> {
    tree: &'a GeneratedTree,
    position: usize,
    answers: Vec<(String, String)>,
}

impl<'a> GeneratedTreeSession<'a> {
    pub fn new(tree: &'a GeneratedTree) -> Self {
        Self { tree, position: 0, answers: Vec::new() }
    }

    pub fn current_question(&self) -> Option<&'a GeneratedQuestion> {
        self.tree.questions.get(self.position)
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.tree.questions.len()
    }

    /// Accepts an option by id or label; returns the next question, if any.
    pub fn answer(&mut self, answer: &str) -> Result<Option<&'a GeneratedQuestion>, WalkError> {
        let question = self.current_question().ok_or(WalkError::Finished)?;
        let wanted = answer.trim();
        let chosen = question
            .options
            .iter()
            .find(|option| option.id == wanted || option.label.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| WalkError::UnknownOption {
                question_id: question.id.clone(),
                answer: wanted.to_string(),
            })?;

        self.answers.push((question.id.clone(), chosen.id.clone()));
        self.position += 1;
        Ok(self.current_question())
    }

    pub fn answers(&self) -> &[(String, String)] {
        &self.answers
    }

    pub fn filters(&self) -> Vec<ProductFilter> {
        self.tree.filters_for(&self.answers)
    }

    pub fn recommend(&self, products: &[Product]) -> Vec<Product> {
        apply_filters(products, &self.filters())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{GeneratedTreeSession, TreeSession, WalkError, WalkStep};
    use crate::domain::product::Product;
    use crate::domain::tree::{
        GeneratedOption, GeneratedQuestion, GeneratedTree, GenerationMetadata,
    };
    use crate::trees::registry::{TreeRegistry, TV_PURCHASE};

    fn tvs() -> Vec<Product> {
        vec![
            Product::new("TV-1", "Vista 55in OLED", Decimal::new(129_900, 2), "Televisions")
                .with_tags(["panel:oled", "hdr", "size:55in"]),
            Product::new("TV-2", "Vista 65in LED", Decimal::new(89_900, 2), "Televisions")
                .with_tags(["panel:led", "gaming"]),
            Product::new("TV-3", "Orbit 55in LED", Decimal::new(49_900, 2), "Televisions")
                .with_tags(["panel:led", "hdr"]),
        ]
    }

    #[test]
    fn static_walk_accumulates_filters() {
        let registry = TreeRegistry::builtin();
        let tree = &registry.get(TV_PURCHASE).expect("tv tree").tree;
        let mut session = TreeSession::start(tree).expect("root");

        assert!(matches!(session.step(), WalkStep::Question { id: "size", .. }));
        session.answer("medium").expect("size");
        session.answer("No preference").expect("panel");
        let step = session.answer("movies").expect("usage");

        assert!(matches!(step, WalkStep::Recommendation { max_results: 5, .. }));
        assert!(session.is_complete());
        assert_eq!(session.filters().len(), 2);
        let skus: Vec<String> =
            session.recommend(&tvs()).into_iter().map(|product| product.sku).collect();
        assert_eq!(skus, vec!["TV-1", "TV-3"]);
        assert_eq!(session.answer("anything"), Err(WalkError::Finished));
    }

    #[test]
    fn unknown_answers_are_rejected_without_moving() {
        let registry = TreeRegistry::builtin();
        let tree = &registry.get(TV_PURCHASE).expect("tv tree").tree;
        let mut session = TreeSession::start(tree).expect("root");

        let error = session.answer("gigantic").expect_err("unknown");
        assert!(matches!(error, WalkError::UnknownOption { ref question_id, .. } if question_id == "size"));
        assert!(session.answers().is_empty());
    }

    #[test]
    fn generated_walk_uses_option_filters() {
        let filters = |pairs: &[(&str, serde_json::Value)]| -> Option<BTreeMap<String, serde_json::Value>> {
            Some(pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect())
        };
        let tree = GeneratedTree {
            id: "televisions_1".to_string(),
            category: "Televisions".to_string(),
            questions: vec![
                GeneratedQuestion {
                    id: "q1".to_string(),
                    text: "Panel?".to_string(),
                    options: vec![
                        GeneratedOption {
                            id: "q1_o1".to_string(),
                            label: "LED".to_string(),
                            filters: filters(&[("panel", json!("led"))]),
                        },
                        GeneratedOption {
                            id: "q1_any".to_string(),
                            label: "Any".to_string(),
                            filters: filters(&[]),
                        },
                    ],
                },
                GeneratedQuestion {
                    id: "q2".to_string(),
                    text: "Extras?".to_string(),
                    options: vec![
                        GeneratedOption {
                            id: "q2_o1".to_string(),
                            label: "HDR".to_string(),
                            filters: filters(&[("hdr", json!(true))]),
                        },
                        GeneratedOption {
                            id: "q2_any".to_string(),
                            label: "Any".to_string(),
                            filters: filters(&[]),
                        },
                    ],
                },
            ],
            metadata: GenerationMetadata {
                total_products: 3,
                top_attributes: vec!["panel".to_string()],
                confidence_score: 0.5,
                model: "test".to_string(),
                generated_at: Utc::now(),
            },
        };

        let mut session = GeneratedTreeSession::new(&tree);
        let next = session.answer("led").expect("q1");
        assert_eq!(next.map(|question| question.id.as_str()), Some("q2"));
        assert_eq!(session.answer("q2_o1").expect("q2"), None);
        assert!(session.is_complete());

        let skus: Vec<String> =
            session.recommend(&tvs()).into_iter().map(|product| product.sku).collect();
        assert_eq!(skus, vec!["TV-3"]);
    }
}
