use crate::domain::tree::{DecisionTree, TreeNode, TreeOption};
use crate::trees::triggers::{TreeTrigger, TriggerContext, TriggerMatch, TriggerMatcher};

pub const TV_PURCHASE: &str = "tv_purchase";
pub const APPLIANCE: &str = "appliance";
pub const FURNITURE: &str = "furniture";
pub const BABY_ESSENTIALS: &str = "baby_essentials";

const RESULTS_NODE: &str = "results";

/// Hand-authored tree together with the trigger that activates it.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticTree {
    pub trigger: TreeTrigger,
    pub tree: DecisionTree,
}

pub struct TreeRegistry {
    trees: Vec<StaticTree>,
    matcher: TriggerMatcher,
}

impl TreeRegistry {
    pub fn new(trees: Vec<StaticTree>) -> Self {
        let matcher = TriggerMatcher::new(trees.iter().map(|entry| entry.trigger.clone()));
        Self { trees, matcher }
    }

    pub fn builtin() -> Self {
        Self::new(vec![tv_purchase(), appliance(), furniture(), baby_essentials()])
    }

    pub fn get(&self, tree_id: &str) -> Option<&StaticTree> {
        self.trees.iter().find(|entry| entry.tree.id == tree_id)
    }

    pub fn trees(&self) -> &[StaticTree] {
        &self.trees
    }

    pub fn matcher(&self) -> &TriggerMatcher {
        &self.matcher
    }

    /// Best trigger match that resolves to a registered tree.
    pub fn match_query(
        &self,
        query: &str,
        context: &TriggerContext,
    ) -> Option<(&StaticTree, TriggerMatch)> {
        self.matcher
            .analyze_triggers(query, context)
            .into_iter()
            .find_map(|found| self.get(&found.tree_id).map(|entry| (entry, found)))
    }
}

impl Default for TreeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn option(label: &str, value: &str, next: &str, filter: Option<&str>) -> TreeOption {
    TreeOption {
        label: label.to_string(),
        value: value.to_string(),
        next_node_id: Some(next.to_string()),
        filter_value: filter.map(str::to_string),
    }
}

fn question(id: &str, text: &str, options: Vec<TreeOption>) -> TreeNode {
    TreeNode::Question { id: id.to_string(), text: text.to_string(), options }
}

fn results(text: &str) -> TreeNode {
    TreeNode::Recommendation { id: RESULTS_NODE.to_string(), text: text.to_string(), max_results: 5 }
}

fn tree(id: &str, category: &str, root: &str, nodes: Vec<TreeNode>) -> DecisionTree {
    DecisionTree {
        id: id.to_string(),
        category: category.to_string(),
        root_node_id: root.to_string(),
        nodes,
    }
}

fn tv_purchase() -> StaticTree {
    StaticTree {
        trigger: TreeTrigger::new(
            TV_PURCHASE,
            [
                "tv",
                "television",
                "new tv",
                "need a tv",
                "smart tv",
                "oled",
                "qled",
                "4k tv",
                "home theater",
            ],
        )
        .with_categories(["televisions", "tv", "electronics"])
        .with_priority(2),
        tree: tree(
            TV_PURCHASE,
            "Televisions",
            "size",
            vec![
                question(
                    "size",
                    "What screen size fits your room?",
                    vec![
                        option("Under 45 inches", "small", "panel", Some("size:43in")),
                        option("50 to 60 inches", "medium", "panel", Some("size:55in")),
                        option("65 inches or more", "large", "panel", Some("size:65in")),
                        option("Not sure", "any", "panel", None),
                    ],
                ),
                question(
                    "panel",
                    "Which picture technology do you prefer?",
                    vec![
                        option("OLED", "oled", "usage", Some("panel:oled")),
                        option("QLED", "qled", "usage", Some("panel:qled")),
                        option("LED", "led", "usage", Some("panel:led")),
                        option("No preference", "any", "usage", None),
                    ],
                ),
                question(
                    "usage",
                    "What will you mostly watch?",
                    vec![
                        option("Sports and gaming", "gaming", RESULTS_NODE, Some("gaming")),
                        option("Movies", "movies", RESULTS_NODE, Some("hdr")),
                        option("A bit of everything", "any", RESULTS_NODE, None),
                    ],
                ),
                results("Here are the TVs that match what you told me."),
            ],
        ),
    }
}

fn appliance() -> StaticTree {
    StaticTree {
        trigger: TreeTrigger::new(
            APPLIANCE,
            [
                "appliance",
                "fridge",
                "refrigerator",
                "washer",
                "dryer",
                "dishwasher",
                "microwave",
                "oven",
                "vacuum",
            ],
        )
        .with_categories(["appliances"])
        .with_priority(1),
        tree: tree(
            APPLIANCE,
            "Appliances",
            "kind",
            vec![
                question(
                    "kind",
                    "Which appliance are you replacing?",
                    vec![
                        option("Refrigerator", "refrigerator", "finish", Some("type:refrigerator")),
                        option("Washer or dryer", "laundry", "finish", Some("type:laundry")),
                        option("Dishwasher", "dishwasher", "finish", Some("type:dishwasher")),
                        option("Something else", "any", "finish", None),
                    ],
                ),
                question(
                    "finish",
                    "Which finish matches your kitchen?",
                    vec![
                        option("Stainless steel", "stainless", RESULTS_NODE, Some("color:stainless")),
                        option("White", "white", RESULTS_NODE, Some("color:white")),
                        option("Black", "black", RESULTS_NODE, Some("color:black")),
                        option("Any", "any", RESULTS_NODE, None),
                    ],
                ),
                results("These appliances fit your space."),
            ],
        ),
    }
}

fn furniture() -> StaticTree {
    StaticTree {
        trigger: TreeTrigger::new(
            FURNITURE,
            ["furniture", "sofa", "couch", "sectional", "dresser", "bookshelf", "living room"],
        )
        .with_categories(["furniture", "home"]),
        tree: tree(
            FURNITURE,
            "Furniture",
            "room",
            vec![
                question(
                    "room",
                    "Which room is this for?",
                    vec![
                        option("Living room", "living_room", "style", Some("room:living room")),
                        option("Bedroom", "bedroom", "style", Some("room:bedroom")),
                        option("Home office", "office", "style", Some("room:office")),
                        option("Any", "any", "style", None),
                    ],
                ),
                question(
                    "style",
                    "What style do you like?",
                    vec![
                        option("Modern", "modern", RESULTS_NODE, Some("style:modern")),
                        option("Traditional", "traditional", RESULTS_NODE, Some("style:traditional")),
                        option("No preference", "any", RESULTS_NODE, None),
                    ],
                ),
                results("Here is furniture for that room."),
            ],
        ),
    }
}

fn baby_essentials() -> StaticTree {
    StaticTree {
        trigger: TreeTrigger::new(
            BABY_ESSENTIALS,
            ["baby", "newborn", "infant", "toddler", "diaper", "stroller", "car seat", "crib"],
        )
        .with_categories(["baby"])
        .with_priority(1),
        tree: tree(
            BABY_ESSENTIALS,
            "Baby",
            "stage",
            vec![
                question(
                    "stage",
                    "How old is the little one?",
                    vec![
                        option("Newborn", "newborn", "need", Some("age:newborn")),
                        option("Infant", "infant", "need", Some("age:infant")),
                        option("Toddler", "toddler", "need", Some("age:toddler")),
                        option("Expecting", "any", "need", None),
                    ],
                ),
                question(
                    "need",
                    "What do you need most right now?",
                    vec![
                        option("Diapering", "diapering", RESULTS_NODE, Some("diapers")),
                        option("Feeding", "feeding", RESULTS_NODE, Some("feeding")),
                        option("Travel gear", "travel", RESULTS_NODE, Some("travel")),
                        option("A bit of everything", "any", RESULTS_NODE, None),
                    ],
                ),
                results("These are our picks for your family."),
            ],
        ),
    }
}
