pub mod comment;
pub mod visitor;

pub use comment::{AddCommentRequest, Comment, CommentView, CommentWithId, EditCommentRequest};
pub use visitor::VisitorRecord;
