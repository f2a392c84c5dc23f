//! Task kinds and their slot templates

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::slot::SlotSpec;

const CITY_SUGGESTIONS: &[&str] = &["New York", "London", "Tokyo", "Paris", "Sydney"];

/// Closed set of task kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FlightBooking,
    Research,
    WebAutomation,
    Generic,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [Self::FlightBooking, Self::Research, Self::WebAutomation, Self::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlightBooking => "flight_booking",
            Self::Research => "research",
            Self::WebAutomation => "web_automation",
            Self::Generic => "generic",
        }
    }

    /// Pick a task kind for a free-text request
    ///
    /// Deterministic keyword match, checked in declaration order.
    pub fn classify(request: &str) -> Self {
        let text = request.to_lowercase();
        let rules: [(TaskKind, &[&str]); 3] = [
            (Self::FlightBooking, &["flight", "fly", "airline", "travel", "trip"]),
            (
                Self::Research,
                &["research", "study", "investigate", "analyze", "analyse", "find information"],
            ),
            (Self::WebAutomation, &["automate", "scrape", "crawl", "website", "web"]),
        ];

        let kind = rules
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(Self::Generic);
        debug!(%kind, "TaskKind::classify: classified request");
        kind
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown task kind: {}", s))
    }
}

/// Immutable, ordered slot schema for one task kind
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub kind: TaskKind,
    /// Short description of what the task does
    pub goal: String,
    /// Template order is the default asking priority
    pub slots: Vec<SlotSpec>,
}

impl Template {
    pub fn new(kind: TaskKind, goal: &str, slots: Vec<SlotSpec>) -> Self {
        Self {
            kind,
            goal: goal.to_string(),
            slots,
        }
    }

    pub fn slot(&self, id: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn required(&self) -> impl Iterator<Item = &SlotSpec> {
        self.slots.iter().filter(|s| s.required)
    }

    pub fn optional(&self) -> impl Iterator<Item = &SlotSpec> {
        self.slots.iter().filter(|s| !s.required)
    }

    pub fn required_count(&self) -> usize {
        self.required().count()
    }

    fn flight_booking() -> Self {
        Self::new(
            TaskKind::FlightBooking,
            "Book a flight",
            vec![
                SlotSpec::text("trip.origin", "Departure City")
                    .with_suggestions(CITY_SUGGESTIONS)
                    .with_reason("Need to know where you're flying from"),
                SlotSpec::text("trip.destination", "Destination City")
                    .with_suggestions(CITY_SUGGESTIONS)
                    .with_reason("Need to know where you're flying to"),
                SlotSpec::date("trip.departure_date", "Departure Date", true)
                    .with_reason("Departure date must be today or in the future"),
                SlotSpec::number("trip.passengers", "Number of Passengers", Some(1.0), Some(9.0))
                    .whole_number()
                    .with_suggestions(&["1", "2", "3", "4", "5", "6"])
                    .with_reason("Need to know how many tickets to book"),
                SlotSpec::choice(
                    "trip.cabin_class",
                    "Cabin Class",
                    &["Economy", "Premium Economy", "Business", "First"],
                )
                .with_reason("Different classes have different prices"),
                SlotSpec::currency("trip.budget", "Budget")
                    .optional()
                    .with_suggestions(&["500 USD", "1000 EUR"])
                    .with_reason("To find flights within your budget"),
            ],
        )
    }

    fn research() -> Self {
        Self::new(
            TaskKind::Research,
            "Conduct research",
            vec![
                SlotSpec::text("research.topic", "Research Topic")
                    .with_suggestions(&["AI trends", "Climate change", "Market analysis", "Technology news"])
                    .with_reason("Need to know what to research"),
                SlotSpec::choice("research.depth", "Research Depth", &["Brief", "Moderate", "Comprehensive"])
                    .with_reason("Determines how thorough the research should be"),
                SlotSpec::date("research.deadline", "Deadline", true)
                    .optional()
                    .with_reason("When you need the research completed"),
                SlotSpec::choice(
                    "research.format",
                    "Output Format",
                    &["Summary", "Detailed Report", "Bullet Points", "Presentation"],
                )
                .with_reason("How you want the research presented"),
                SlotSpec::text("research.sources", "Preferred Sources")
                    .optional()
                    .with_suggestions(&["academic papers", "news articles", "industry reports"])
                    .with_reason("Specific sources or types of sources to focus on"),
            ],
        )
    }

    fn web_automation() -> Self {
        Self::new(
            TaskKind::WebAutomation,
            "Automate a web task",
            vec![
                SlotSpec::text("automation.url", "Target Website")
                    .with_suggestions(&["https://example.com"])
                    .with_reason("Need to know which website to automate"),
                SlotSpec::choice(
                    "automation.action",
                    "Action to Perform",
                    &["Scrape Data", "Fill Form", "Click Elements", "Monitor Changes", "Download Files"],
                )
                .with_reason("What action should be performed on the website"),
                SlotSpec::text("automation.target", "Target Element or Data")
                    .with_suggestions(&["product prices", "contact form", "download button"])
                    .with_reason("What specific element or data to interact with"),
                SlotSpec::choice("automation.schedule", "Schedule", &["Once", "Daily", "Weekly", "Monthly"])
                    .optional()
                    .with_reason("How often to run the automation"),
                SlotSpec::choice("automation.notify", "Notification Method", &["Email", "Slack", "None"])
                    .optional()
                    .with_reason("How to notify you of results"),
            ],
        )
    }

    fn generic() -> Self {
        Self::new(
            TaskKind::Generic,
            "Complete a general task",
            vec![
                SlotSpec::text("task.details", "Task Details")
                    .with_reason("Need more details to understand what you want to accomplish"),
                SlotSpec::choice("task.priority", "Priority Level", &["Low", "Medium", "High", "Urgent"])
                    .optional()
                    .with_reason("To prioritize your task appropriately"),
            ],
        )
    }
}

/// One template per task kind, loaded once at startup
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    flight_booking: Arc<Template>,
    research: Arc<Template>,
    web_automation: Arc<Template>,
    generic: Arc<Template>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRegistry {
    /// Registry with the built-in templates
    pub fn builtin() -> Self {
        Self {
            flight_booking: Arc::new(Template::flight_booking()),
            research: Arc::new(Template::research()),
            web_automation: Arc::new(Template::web_automation()),
            generic: Arc::new(Template::generic()),
        }
    }

    /// Replace the template for `template.kind`
    pub fn with_template(mut self, template: Template) -> Self {
        debug!(kind = %template.kind, "TemplateRegistry::with_template: called");
        let slot = match template.kind {
            TaskKind::FlightBooking => &mut self.flight_booking,
            TaskKind::Research => &mut self.research,
            TaskKind::WebAutomation => &mut self.web_automation,
            TaskKind::Generic => &mut self.generic,
        };
        *slot = Arc::new(template);
        self
    }

    pub fn get(&self, kind: TaskKind) -> &Arc<Template> {
        match kind {
            TaskKind::FlightBooking => &self.flight_booking,
            TaskKind::Research => &self.research,
            TaskKind::WebAutomation => &self.web_automation,
            TaskKind::Generic => &self.generic,
        }
    }

    /// Classify a request and return the matching template
    pub fn classify(&self, request: &str) -> &Arc<Template> {
        self.get(TaskKind::classify(request))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Template>> {
        TaskKind::ALL.into_iter().map(|kind| self.get(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SlotType;
    use std::collections::HashSet;

    #[test]
    fn test_classify_keywords() {
        assert_eq!(TaskKind::classify("Book me a flight to Paris"), TaskKind::FlightBooking);
        assert_eq!(TaskKind::classify("Plan a TRIP"), TaskKind::FlightBooking);
        assert_eq!(TaskKind::classify("Research solar panels"), TaskKind::Research);
        assert_eq!(TaskKind::classify("scrape prices from a site"), TaskKind::WebAutomation);
        assert_eq!(TaskKind::classify("water my plants"), TaskKind::Generic);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let registry = TemplateRegistry::builtin();
        let request = "I need to travel to Tokyo next month";

        let first = registry.classify(request);
        let second = registry.classify(request);

        assert_eq!(first.kind, second.kind);
        let ids = |t: &Template| t.required().map(|s| s.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(first), ids(second));
    }

    #[test]
    fn test_flight_template_shape() {
        let registry = TemplateRegistry::builtin();
        let flight = registry.get(TaskKind::FlightBooking);

        let required: Vec<&str> = flight.required().map(|s| s.id.as_str()).collect();
        assert_eq!(
            required,
            vec![
                "trip.origin",
                "trip.destination",
                "trip.departure_date",
                "trip.passengers",
                "trip.cabin_class"
            ]
        );
        let optional: Vec<&str> = flight.optional().map(|s| s.id.as_str()).collect();
        assert_eq!(optional, vec!["trip.budget"]);
        assert_eq!(flight.slot("trip.budget").unwrap().slot_type(), SlotType::Currency);

        let today = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let passengers = flight.slot("trip.passengers").unwrap();
        assert!(passengers.validate("2.5", today).is_err());
        assert!(passengers.validate("2", today).is_ok());
    }

    #[test]
    fn test_slot_ids_unique_per_template() {
        let registry = TemplateRegistry::builtin();
        for template in registry.iter() {
            let ids: HashSet<&str> = template.slots.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids.len(), template.slots.len(), "duplicate slot id in {}", template.kind);
            assert!(template.required_count() > 0);
        }
    }

    #[test]
    fn test_with_template_replaces_one_kind() {
        let registry = TemplateRegistry::builtin().with_template(Template::new(
            TaskKind::Generic,
            "Anything",
            vec![SlotSpec::text("task.what", "What")],
        ));

        assert_eq!(registry.get(TaskKind::Generic).slots.len(), 1);
        assert_eq!(registry.get(TaskKind::FlightBooking).required_count(), 5);
    }

    #[test]
    fn test_task_kind_from_str() {
        assert_eq!("research".parse::<TaskKind>().unwrap(), TaskKind::Research);
        assert_eq!("WEB_AUTOMATION".parse::<TaskKind>().unwrap(), TaskKind::WebAutomation);
        assert!("cooking".parse::<TaskKind>().is_err());
    }
}
