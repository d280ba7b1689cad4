//! Prompt suites
//!
//! A [`SuiteRegistry`] maps suite names to ordered prompt collections. The
//! built-in registry carries four themed suites plus `all`, which
//! concatenates them in registration order. Extra suites can be loaded from
//! YAML files.

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Default completion budget when a prompt does not set its own.
pub const DEFAULT_PROMPT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Reasoning,
    Coding,
    Creative,
    Factual,
    Custom,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Reasoning => "reasoning",
            Category::Coding => "coding",
            Category::Creative => "creative",
            Category::Factual => "factual",
            Category::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// A single benchmark prompt with an optional reference answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_category() -> Category {
    Category::Custom
}

impl Prompt {
    pub fn new(text: impl Into<String>, category: Category) -> Self {
        Prompt {
            text: text.into(),
            category,
            reference: None,
            max_tokens: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A named, ordered collection of prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSuite {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompts: Vec<Prompt>,
}

impl PromptSuite {
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Load a suite from YAML:
    ///
    /// ```yaml
    /// name: support
    /// description: Customer support answers
    /// prompts:
    ///   - text: How do I reset my password?
    ///     reference: Use the "Forgot password" link on the login page.
    ///     max_tokens: 128
    /// ```
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading prompt suite from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let suite: PromptSuite = serde_yaml::from_str(&content)?;
        if suite.prompts.is_empty() {
            return Err(BenchError::Config(format!(
                "suite '{}' in {} has no prompts",
                suite.name,
                path.display()
            )));
        }
        Ok(suite)
    }
}

/// Named suites in registration order
#[derive(Debug, Clone, Default)]
pub struct SuiteRegistry {
    suites: Vec<PromptSuite>,
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite, replacing any existing suite with the same name.
    pub fn register(&mut self, suite: PromptSuite) -> &mut Self {
        match self.suites.iter_mut().find(|s| s.name == suite.name) {
            Some(existing) => *existing = suite,
            None => self.suites.push(suite),
        }
        self
    }

    pub fn get(&self, name: &str) -> Result<&PromptSuite> {
        self.suites
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BenchError::SuiteNotFound {
                name: name.to_string(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.suites.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PromptSuite> {
        self.suites.iter()
    }

    /// The four themed suites and `all`.
    pub fn builtin() -> Self {
        let themed = [reasoning(), coding(), creative(), factual()];
        let all = PromptSuite {
            name: "all".to_string(),
            description: "All built-in prompts combined".to_string(),
            prompts: themed.iter().flat_map(|s| s.prompts.clone()).collect(),
        };

        let mut registry = SuiteRegistry::new();
        for suite in themed {
            registry.register(suite);
        }
        registry.register(all);
        registry
    }
}

fn suite(name: &str, description: &str, prompts: Vec<Prompt>) -> PromptSuite {
    PromptSuite {
        name: name.to_string(),
        description: description.to_string(),
        prompts,
    }
}

fn reasoning() -> PromptSuite {
    let p = |text: &str, reference: &str| {
        Prompt::new(text, Category::Reasoning).with_reference(reference)
    };
    suite(
        "reasoning",
        "Logic, math, and step-by-step reasoning tasks",
        vec![
            p(
                "A farmer has 17 sheep. All but 9 run away. How many sheep does the farmer have left? Explain your reasoning step by step.",
                "9 sheep. 'All but 9' means 9 remain.",
            ),
            p(
                "If it takes 5 machines 5 minutes to make 5 widgets, how long would it take 100 machines to make 100 widgets? Think carefully.",
                "5 minutes. Each machine makes 1 widget in 5 minutes.",
            ),
            p(
                "I have a 3-gallon jug and a 5-gallon jug. How do I measure exactly 4 gallons of water? Show your steps.",
                "Fill the 5-gallon jug, pour into the 3-gallon jug leaving 2, empty the 3-gallon jug, pour the 2 gallons in, refill the 5-gallon jug and top up the 3-gallon jug. 4 gallons remain in the 5-gallon jug.",
            ),
            p(
                "Three friends split a $30 dinner bill equally. They each pay $10. The waiter realizes the bill is only $25 and returns $5. They each take $1 back, tipping $2 total. They each paid $9 (totaling $27) plus $2 tip = $29. Where is the missing dollar? Explain.",
                "There is no missing dollar. The $27 paid includes the $25 bill plus the $2 tip. Adding the tip to $27 double-counts it.",
            ),
            p(
                "What is the next number in the sequence: 1, 1, 2, 3, 5, 8, 13, ...? Explain the pattern.",
                "21. This is the Fibonacci sequence where each number is the sum of the two preceding numbers.",
            ),
        ],
    )
}

fn coding() -> PromptSuite {
    let p = |text: &str, reference: &str| Prompt::new(text, Category::Coding).with_reference(reference);
    suite(
        "coding",
        "Code generation and explanation tasks",
        vec![
            p(
                "Write a Python function that checks if a string is a palindrome. Include type hints and handle edge cases.",
                "def is_palindrome(s: str) -> bool: cleaned = ''.join(c.lower() for c in s if c.isalnum()); return cleaned == cleaned[::-1]",
            ),
            p(
                "Implement binary search in Python. The function should return the index of the target or -1 if not found. Include type hints.",
                "def binary_search(arr: list[int], target: int) -> int",
            ),
            p(
                "Write a Python function to flatten a nested list of arbitrary depth. For example, [1, [2, [3, 4], 5]] becomes [1, 2, 3, 4, 5].",
                "def flatten(lst): result = []; for item in lst: result.extend(flatten(item) if isinstance(item, list) else [item]); return result",
            ),
            p(
                "Write a Python decorator that retries a function up to N times with exponential backoff if it raises an exception.",
                "A decorator using functools.wraps with a loop, try/except, and time.sleep(2**attempt) backoff.",
            ),
            p(
                "Explain the difference between a list and a tuple in Python. When should you use each? Give code examples.",
                "Lists are mutable (append, remove), tuples are immutable. Use tuples for fixed collections, dict keys, and function returns.",
            ),
        ],
    )
}

fn creative() -> PromptSuite {
    let p = |text: &str| Prompt::new(text, Category::Creative);
    suite(
        "creative",
        "Creative writing and storytelling tasks",
        vec![
            p("Write a haiku about debugging code at 3 AM.").with_max_tokens(128),
            p("In exactly 50 words, tell a complete story with a beginning, middle, and end about a robot learning to paint.")
                .with_max_tokens(256),
            p("Write a product description for a time machine that fits in your pocket. Make it sound like a flagship product launch."),
            p("Create a short dialogue between a semicolon and an em dash arguing about which punctuation mark is more useful."),
            p("Write 3 metaphors that explain how a neural network learns, aimed at a 10-year-old audience.")
                .with_max_tokens(256),
        ],
    )
}

fn factual() -> PromptSuite {
    let p = |text: &str, reference: &str| Prompt::new(text, Category::Factual).with_reference(reference);
    suite(
        "factual",
        "Factual recall and knowledge tasks",
        vec![
            p(
                "What are the three laws of thermodynamics? Explain each in one sentence.",
                "1st: Energy cannot be created or destroyed. 2nd: Entropy of an isolated system always increases. 3rd: Entropy approaches zero as temperature approaches absolute zero.",
            ),
            p(
                "List the planets in our solar system in order from the Sun, and state which ones are gas giants.",
                "Mercury, Venus, Earth, Mars, Jupiter, Saturn, Uranus, Neptune. Gas giants: Jupiter, Saturn. Ice giants: Uranus, Neptune.",
            ),
            p(
                "Who invented the World Wide Web, in what year, and at which institution?",
                "Tim Berners-Lee, 1989, CERN.",
            ),
            p(
                "What is the Big O time complexity of quicksort in the average case and the worst case? Explain why.",
                "Average: O(n log n) with good pivot selection. Worst: O(n^2) when the pivot is always the smallest or largest element.",
            ),
            p(
                "Explain what DNS is and describe what happens when you type a URL into a browser, in 5 steps or fewer.",
                "DNS translates domain names to IP addresses. The browser checks its cache, queries a resolver, the resolver walks root, TLD and authoritative servers, the IP is returned, and the browser connects over HTTP or HTTPS.",
            ),
        ],
    )
}
