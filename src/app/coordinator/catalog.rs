//! Source of courses and their content trees

use async_trait::async_trait;

use crate::app::models::{ContentNode, CourseInfo};
use crate::errors::Result;

/// Lists enrolled courses and fetches their content
///
/// Any error returned here ends the run.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Courses of the signed-in user, with resolved names
    async fn list_courses(&self) -> Result<Vec<CourseInfo>>;

    /// Content tree of one course, rooted at a synthetic node with id `-1`
    async fn course_contents(&self, course_id: i64) -> Result<ContentNode>;
}
