use super::DbExecutor;
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::Sqlite;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct StudentId(pub Uuid);

impl StudentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StudentId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct InternalStudent {
    #[serde(default)]
    pub id: StudentId,
    pub name: String,
    pub program: String,
    pub vote_count: u32,
}

pub(crate) const STUDENT_COLUMNS: &str = "id, name, program, vote_count";

/// Students in storage order.
pub async fn all<'e, E>(executor: E) -> Result<Vec<InternalStudent>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, InternalStudent>(&format!(
        "SELECT {} FROM students ORDER BY seq",
        STUDENT_COLUMNS
    ))
    .fetch_all(executor)
    .await
}

/// Adds one vote to the named student, creating the student with a single
/// vote when the name is new.
pub async fn credit_vote<'e, E>(
    executor: E,
    name: &str,
    program: &str,
) -> Result<InternalStudent, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, InternalStudent>(&format!(
        r#"
        INSERT INTO students (id, name, program, vote_count) VALUES (?, ?, ?, 1)
        ON CONFLICT (name) DO UPDATE SET vote_count = vote_count + 1
        RETURNING {}
        "#,
        STUDENT_COLUMNS
    ))
    .bind(StudentId::new())
    .bind(name)
    .bind(program)
    .fetch_one(executor)
    .await
}

/// Students ordered by descending votes, ties kept in storage order.
pub fn leaderboard(mut students: Vec<InternalStudent>) -> Vec<InternalStudent> {
    students.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
    students
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<InternalStudent>, Report>")]
pub struct AllStudents;

async_message_handler_with_span! {
    impl AsyncSpanHandler<AllStudents> for DbExecutor {
        async fn handle(_msg: AllStudents) -> Result<Vec<InternalStudent>, Report> {
            debug!("Retrieving students");
            let pool = with_ctx(|a: &mut DbExecutor, _| a.pool());
            let students = all(&pool).await?;
            debug!("Students found {}", students.len());
            Ok(students)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::new_memory_pool;

    fn student(name: &str, vote_count: u32) -> InternalStudent {
        InternalStudent {
            id: StudentId::new(),
            name: name.to_owned(),
            program: "Law".to_owned(),
            vote_count,
        }
    }

    #[test]
    fn leaderboard_is_stable() {
        let students = vec![
            student("Ana", 1),
            student("Bea", 3),
            student("Caro", 1),
            student("Dani", 3),
        ];
        let names: Vec<String> = leaderboard(students)
            .into_iter()
            .map(|student| student.name)
            .collect();
        assert_eq!(names, vec!["Bea", "Dani", "Ana", "Caro"]);
    }

    #[actix_rt::test]
    async fn credit_vote_creates_then_increments() {
        let pool = new_memory_pool().await.unwrap();
        assert!(all(&pool).await.unwrap().is_empty());

        let created = credit_vote(&pool, "Ana", "Law").await.unwrap();
        assert_eq!(created.vote_count, 1);

        let credited = credit_vote(&pool, "Ana", "Medicine").await.unwrap();
        assert_eq!(credited.id, created.id);
        assert_eq!(credited.vote_count, 2);
        assert_eq!(credited.program, "Law");

        credit_vote(&pool, "Bea", "Art").await.unwrap();
        let names: Vec<String> = all(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|student| student.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Bea"]);
    }
}
