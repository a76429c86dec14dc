//! Typed views over the free-form activity payload.
//!
//! `Activity.data` arrives as arbitrary JSON. Rather than digging into it deep
//! inside business logic, each kind-specific handler narrows the payload into
//! one of these structs at the dispatch boundary. Wire field names are
//! camelCase, matching what the caller-facing layer submits.

use crate::ids::{LessonId, ModuleId, QuizId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of a `course_purchase` activity.
///
/// The transaction details are optional: a purchase activity without them is
/// persisted normally and simply produces no ledger row.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    /// Details of the monetary transaction, if the gateway supplied them.
    pub transaction_details: Option<TransactionDetails>,
}

/// Monetary details carried by a purchase activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    /// Amount paid, in the currency's major unit.
    pub amount: f64,
    /// ISO currency code; the ledger default applies when absent.
    pub currency: Option<String>,
    /// How the learner paid (e.g. `"card"`, `"paypal"`).
    pub payment_method: String,
    /// Gateway-specific metadata (order ids, capture ids, ...).
    #[serde(default)]
    pub payment_details: serde_json::Value,
}

/// Payload of a `course_enrollment` activity: the course skeleton used to
/// seed the progress aggregate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentPayload {
    /// Modules of the course being enrolled in, in course order.
    #[serde(default)]
    pub course_modules: Vec<CourseModuleSeed>,
}

/// One module of the enrollment skeleton.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModuleSeed {
    /// Module id.
    pub id: ModuleId,
    /// Human-readable module name.
    pub name: String,
    /// Lessons in the module, in order.
    #[serde(default)]
    pub lessons: Vec<SeedRef>,
    /// Quizzes in the module, in order.
    #[serde(default)]
    pub quizzes: Vec<SeedRef>,
}

/// A lesson or quiz reference inside the enrollment skeleton.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedRef {
    /// Lesson or quiz id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

/// Payload of a `quiz_completion` activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCompletionPayload {
    /// The quiz that was completed.
    pub quiz_id: QuizId,
    /// The module the quiz belongs to.
    pub module_id: ModuleId,
    /// Quiz name, used when the quiz is first seen on the aggregate.
    pub quiz_name: Option<String>,
    /// Score achieved, 0-100.
    pub score: u8,
    /// Per-question answers, kept verbatim on the attempt.
    #[serde(default)]
    pub answers: serde_json::Value,
    /// Seconds spent on this attempt.
    pub time_spent: u64,
    /// When the attempt started, if the client tracked it.
    pub start_time: Option<DateTime<Utc>>,
    /// Passing threshold for this quiz; defaults when absent.
    pub passing_score: Option<u8>,
}

/// Payload of a `lesson_completion` activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompletionPayload {
    /// The lesson that was completed.
    pub lesson_id: LessonId,
    /// The module the lesson belongs to.
    pub module_id: ModuleId,
    /// Lesson name, used when the lesson is first seen on the aggregate.
    pub lesson_name: Option<String>,
    /// Seconds spent on the lesson in this sitting.
    pub time_spent: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn purchase_payload_from_camel_case_wire() {
        let payload: PurchasePayload = serde_json::from_value(json!({
            "transactionDetails": {
                "amount": 49.99,
                "currency": "EUR",
                "paymentMethod": "card",
                "paymentDetails": { "orderId": "ord-1" }
            }
        }))
        .unwrap();
        let details = payload.transaction_details.unwrap();
        assert!((details.amount - 49.99).abs() < f64::EPSILON);
        assert_eq!(details.currency.as_deref(), Some("EUR"));
        assert_eq!(details.payment_method, "card");
        assert_eq!(details.payment_details["orderId"], "ord-1");
    }

    #[test]
    fn purchase_payload_without_details() {
        let payload: PurchasePayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.transaction_details.is_none());
    }

    #[test]
    fn enrollment_payload_with_skeleton() {
        let payload: EnrollmentPayload = serde_json::from_value(json!({
            "courseModules": [{
                "id": "m1",
                "name": "Basics",
                "lessons": [{ "id": "l1", "name": "Intro" }],
                "quizzes": [{ "id": "q1", "name": "Checkpoint" }]
            }]
        }))
        .unwrap();
        assert_eq!(payload.course_modules.len(), 1);
        let module = &payload.course_modules[0];
        assert_eq!(module.id, ModuleId::new("m1"));
        assert_eq!(module.lessons[0].id, "l1");
        assert_eq!(module.quizzes[0].name, "Checkpoint");
    }

    #[test]
    fn quiz_completion_payload_defaults() {
        let payload: QuizCompletionPayload = serde_json::from_value(json!({
            "quizId": "q1",
            "moduleId": "m1",
            "score": 80,
            "timeSpent": 300
        }))
        .unwrap();
        assert_eq!(payload.score, 80);
        assert_eq!(payload.time_spent, 300);
        assert!(payload.passing_score.is_none());
        assert!(payload.answers.is_null());
    }

    #[test]
    fn lesson_completion_payload_requires_module() {
        let result: Result<LessonCompletionPayload, _> = serde_json::from_value(json!({
            "lessonId": "l1",
            "timeSpent": 60
        }));
        assert!(result.is_err());
    }
}
