pub mod draft;
pub mod evaluation;
pub mod item;
pub mod revision;
pub mod submission;

pub use draft::{live_draft, Draft, DraftId, DraftStatus, NewDraft, HUMAN_MODEL_ID};
pub use evaluation::{Evaluation, EvaluationId, NewEvaluation};
pub use item::{normalize_question, Item, ItemId, ItemStatus, HUMAN_PROVIDED_CONTEXT};
pub use revision::{HumanItem, RevisionBatch, RevisionEntry, RevisionTarget};
pub use submission::{Submission, SubmissionId, SubmissionStatus};
