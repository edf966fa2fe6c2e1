//! 类型模块：批处理调度使用的核心数据类型。
//!
//! # Types Module
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ItemPayload`] | Encoded image plus filename and MIME type |
//! | [`PayloadSource`] | Inline payload or a file read at dispatch time |
//! | [`RemoteJob`] | Client-side view of one outstanding submission |
//! | [`JobSnapshot`] | One status poll answer |
//! | [`JobOutcome`] | Result of a finished job |
//! | [`QuestionContent`] | Normalized per-item success record |

pub mod item;
pub mod job;

pub use item::{guess_image_mime, ItemPayload, PayloadSource};
pub use job::{
    ItemResult, JobOutcome, JobProgress, JobSnapshot, JobStatus, QuestionContent, RemoteJob,
    SubmitReceipt, UNKNOWN_QUESTION_TYPE, UNRECOGNIZED_QUESTION,
};
