use crate::domain::tree::GeneratedTree;

/// Lists every structural defect of a generated tree. An empty list means the tree is usable.
pub fn validate_tree(tree: &GeneratedTree) -> Vec<String> {
    let mut defects = Vec::new();

    if tree.id.trim().is_empty() {
        defects.push("tree id is empty".to_string());
    }
    if tree.category.trim().is_empty() {
        defects.push("tree category is empty".to_string());
    }
    if tree.questions.is_empty() {
        defects.push("tree has no questions".to_string());
    }

    for (index, question) in tree.questions.iter().enumerate() {
        let label = if question.id.trim().is_empty() {
            defects.push(format!("question {index} has no id"));
            format!("#{index}")
        } else {
            question.id.clone()
        };
        if question.text.trim().is_empty() {
            defects.push(format!("question {label} has no text"));
        }
        if question.options.len() < 2 {
            defects.push(format!("question {label} has fewer than 2 options"));
        }
        for (option_index, option) in question.options.iter().enumerate() {
            if option.id.trim().is_empty() {
                defects.push(format!("option {option_index} of question {label} has no id"));
            }
            if option.label.trim().is_empty() {
                defects.push(format!("option {option_index} of question {label} has no label"));
            }
            if option.filters.is_none() {
                defects.push(format!("option {option_index} of question {label} has no filters"));
            }
        }
    }

    defects
}

/// Defects that make a tree unusable for a guided flow.
pub fn is_fatal(tree: &GeneratedTree) -> bool {
    tree.questions.is_empty() || tree.questions.iter().any(|question| question.options.len() < 2)
}
