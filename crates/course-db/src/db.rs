use anyhow::{bail, Result};
use async_trait::async_trait;
use grade_core::{CourseAverageLookup, CourseFeatures, PredictionError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::models::*;

/// Largest page the course listing will return.
pub const MAX_PAGE_SIZE: i64 = 100;

const GRADE_ORDER: &str = r#"
    CASE letter_grade
        WHEN 'A+' THEN 1 WHEN 'A' THEN 2 WHEN 'A-' THEN 3
        WHEN 'B+' THEN 4 WHEN 'B' THEN 5 WHEN 'B-' THEN 6
        WHEN 'C+' THEN 7 WHEN 'C' THEN 8 WHEN 'C-' THEN 9
        WHEN 'D+' THEN 10 WHEN 'D' THEN 11 WHEN 'D-' THEN 12
        WHEN 'F' THEN 13
        ELSE 14
    END
"#;

/// Read-only handle on the course database.
#[derive(Clone)]
pub struct CourseDb {
    pool: SqlitePool,
}

impl CourseDb {
    /// Open an existing database file in read-only mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Course database not found at {}", path.display());
        }

        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Opened course database at {}", path.display());
        Ok(Self { pool })
    }

    /// Empty in-memory database with the schema applied. A single connection
    /// keeps every query on the same memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        let schema = include_str!("../schema.sql");

        // sqlx executes one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// True when a trivial query succeeds.
    pub async fn ping(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Database ping failed: {}", e);
                false
            }
        }
    }

    /// Courses ordered by enrolment, largest first.
    pub async fn list_courses(
        &self,
        subject: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CourseSummary>> {
        let courses = sqlx::query_as::<_, CourseSummary>(
            r#"
            SELECT
                c.course_id,
                c.subject,
                c.number,
                c.subject || ' ' || c.number AS full_name,
                c.avg_gpa,
                c.total_students,
                cf.grade_entropy,
                cf.grade_skewness,
                cf.pct_a_range,
                cf.pct_passing,
                EXISTS(SELECT 1 FROM grading_structure gs WHERE gs.course_id = c.course_id)
                    AS has_grading_structure
            FROM courses c
            LEFT JOIN course_features cf ON c.course_id = cf.course_id
            WHERE (? IS NULL OR c.subject = ?)
            ORDER BY c.total_students DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(subject)
        .bind(subject)
        .bind(limit.clamp(1, MAX_PAGE_SIZE))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(courses)
    }

    pub async fn count_courses(&self, subject: Option<&str>) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM courses WHERE (? IS NULL OR subject = ?)")
                .bind(subject)
                .bind(subject)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Course metadata with its grade distribution and grading structure.
    pub async fn get_course(&self, course_id: i64) -> Result<Option<CourseDetail>> {
        let row = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT
                c.course_id,
                c.subject,
                c.number,
                c.subject || ' ' || c.number AS full_name,
                c.avg_gpa,
                c.total_students,
                cf.grade_entropy,
                cf.grade_skewness,
                cf.pct_a_range,
                cf.pct_passing
            FROM courses c
            LEFT JOIN course_features cf ON c.course_id = cf.course_id
            WHERE c.course_id = ?
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let grade_distribution = sqlx::query_as::<_, GradeShare>(&format!(
            "SELECT letter_grade, percentage FROM grade_distributions WHERE course_id = ? ORDER BY {}",
            GRADE_ORDER
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let grading_structure = sqlx::query_as::<_, GradingStructure>(
            r#"
            SELECT
                pct_exams, pct_projects, pct_homework, pct_participation, pct_other,
                num_exams, num_projects, num_homeworks, has_final_exam, notes, source_url
            FROM grading_structure
            WHERE course_id = ?
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Some(CourseDetail {
            course_id: row.course_id,
            subject: row.subject,
            number: row.number,
            full_name: row.full_name,
            avg_gpa: row.avg_gpa,
            total_students: row.total_students,
            grade_entropy: row.features.grade_entropy,
            grade_skewness: row.features.grade_skewness,
            pct_a_range: row.features.pct_a_range,
            pct_passing: row.features.pct_passing,
            grade_distribution,
            grading_structure,
        }))
    }

    pub async fn course_info(&self, course_id: i64) -> Result<Option<CourseInfo>> {
        let info = sqlx::query_as::<_, CourseInfo>(
            r#"
            SELECT course_id, subject, number, subject || ' ' || number AS full_name, avg_gpa
            FROM courses
            WHERE course_id = ?
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(info)
    }

    /// Numeric model inputs for a course. Absent values are left out of the
    /// map so the model can report exactly which feature is missing.
    pub async fn course_features(&self, course_id: i64) -> Result<Option<CourseFeatures>> {
        let row = sqlx::query_as::<_, FeatureRow>(
            r#"
            SELECT
                cf.grade_entropy,
                cf.grade_skewness,
                cf.pct_a_range,
                cf.pct_passing,
                CAST(cf.exam_heavy AS REAL) AS exam_heavy,
                CAST(cf.project_heavy AS REAL) AS project_heavy,
                CAST(cf.has_projects AS REAL) AS has_projects,
                CAST(cf.is_theory_course AS REAL) AS is_theory_course,
                CAST(cf.total_assessments AS REAL) AS total_assessments,
                gs.pct_exams,
                gs.pct_projects,
                gs.pct_homework,
                CASE WHEN cf.course_level = 'upper_div' THEN 1.0 ELSE 0.0 END AS is_upper_div
            FROM course_features cf
            LEFT JOIN grading_structure gs ON cf.course_id = gs.course_id
            WHERE cf.course_id = ?
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let mut features = CourseFeatures::new();
            features.insert("grade_entropy", row.grade_entropy);
            features.insert("grade_skewness", row.grade_skewness);
            features.insert("pct_a_range", row.pct_a_range);
            features.insert("pct_passing", row.pct_passing);
            features.insert("exam_heavy", row.exam_heavy);
            features.insert("project_heavy", row.project_heavy);
            features.insert("has_projects", row.has_projects);
            features.insert("is_theory_course", row.is_theory_course);
            features.insert("total_assessments", row.total_assessments);
            features.insert("pct_exams", row.pct_exams);
            features.insert("pct_projects", row.pct_projects);
            features.insert("pct_homework", row.pct_homework);
            features.insert("is_upper_div", Some(row.is_upper_div));
            features
        }))
    }

    /// Historical average GPA per course name, for names of the form
    /// `"SUBJECT NUMBER"`. The first token is the subject and the rest is the
    /// number, so `"DATA C 8"` looks up number `"C 8"`. Malformed names and
    /// courses without an average are left out.
    pub async fn course_averages(&self, names: &[String]) -> Result<HashMap<String, f64>> {
        let mut averages = HashMap::new();

        for name in names {
            let tokens: Vec<&str> = name.split_whitespace().collect();
            let [subject, rest @ ..] = tokens.as_slice() else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let number = rest.join(" ");

            let avg: Option<(Option<f64>,)> =
                sqlx::query_as("SELECT avg_gpa FROM courses WHERE subject = ? AND number = ?")
                    .bind(*subject)
                    .bind(&number)
                    .fetch_optional(&self.pool)
                    .await?;

            if let Some((Some(gpa),)) = avg {
                averages.insert(name.clone(), gpa);
            }
        }

        tracing::debug!("Resolved {} of {} course averages", averages.len(), names.len());
        Ok(averages)
    }
}

#[async_trait]
impl CourseAverageLookup for CourseDb {
    async fn course_averages(
        &self,
        course_names: &[String],
    ) -> Result<HashMap<String, f64>, PredictionError> {
        CourseDb::course_averages(self, course_names)
            .await
            .map_err(|e| PredictionError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> CourseDb {
        let db = CourseDb::in_memory().await.unwrap();
        let statements = [
            "INSERT INTO courses VALUES (1, 'COMPSCI', '61A', 3.1, 1200)",
            "INSERT INTO courses VALUES (2, 'DATA', 'C8', 3.4, 1500)",
            "INSERT INTO courses VALUES (3, 'COMPSCI', '170', 2.9, 600)",
            "INSERT INTO courses VALUES (4, 'MATH', '1A', NULL, 300)",
            "INSERT INTO course_features VALUES (1, 2.1, -0.4, 35.0, 92.0, 1, 0, 1, 0, 6, 'lower_div')",
            "INSERT INTO course_features VALUES (3, 2.3, -0.2, 25.0, 88.0, 1, 0, 0, 1, 4, 'upper_div')",
            "INSERT INTO grading_structure VALUES (3, 60.0, 0.0, 30.0, 10.0, 0.0, 3, 0, 10, 1, NULL, NULL)",
            "INSERT INTO grade_distributions (course_id, letter_grade, student_count, percentage) VALUES (1, 'B', 300, 25.0)",
            "INSERT INTO grade_distributions (course_id, letter_grade, student_count, percentage) VALUES (1, 'A+', 120, 10.0)",
            "INSERT INTO grade_distributions (course_id, letter_grade, student_count, percentage) VALUES (1, 'F', 24, 2.0)",
            "INSERT INTO grade_distributions (course_id, letter_grade, student_count, percentage) VALUES (1, 'A', 360, 30.0)",
        ];
        for stmt in statements {
            sqlx::query(stmt).execute(db.pool()).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_ping() {
        let db = CourseDb::in_memory().await.unwrap();
        assert!(db.ping().await);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        assert!(CourseDb::open(Path::new("/nonexistent/courses.db")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_courses_orders_by_enrolment() {
        let db = seeded().await;
        let courses = db.list_courses(None, 50, 0).await.unwrap();
        let ids: Vec<i64> = courses.iter().map(|c| c.course_id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4]);
        assert_eq!(courses[1].full_name, "COMPSCI 61A");
        assert_eq!(courses[1].features.pct_a_range, Some(35.0));
        assert!(courses[2].has_grading_structure);
        assert!(!courses[1].has_grading_structure);
        // No feature row for DATA C8
        assert_eq!(courses[0].features, CourseFeatureSummary::default());
    }

    #[tokio::test]
    async fn test_list_courses_filters_and_paginates() {
        let db = seeded().await;
        let cs = db.list_courses(Some("COMPSCI"), 1, 1).await.unwrap();
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].course_id, 3);
        assert_eq!(db.count_courses(Some("COMPSCI")).await.unwrap(), 2);
        assert_eq!(db.count_courses(None).await.unwrap(), 4);
        assert_eq!(db.count_courses(Some("PHYSICS")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_course_orders_grades() {
        let db = seeded().await;
        let course = db.get_course(1).await.unwrap().unwrap();
        let letters: Vec<&str> = course
            .grade_distribution
            .iter()
            .map(|g| g.letter_grade.as_str())
            .collect();
        assert_eq!(letters, vec!["A+", "A", "B", "F"]);
        assert!(course.grading_structure.is_none());

        let upper = db.get_course(3).await.unwrap().unwrap();
        let gs = upper.grading_structure.unwrap();
        assert_eq!(gs.pct_exams, Some(60.0));
        assert_eq!(gs.has_final_exam, Some(true));

        assert!(db.get_course(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_course_features() {
        let db = seeded().await;
        let lower = db.course_features(1).await.unwrap().unwrap();
        assert_eq!(lower.get("grade_entropy"), Some(2.1));
        assert_eq!(lower.get("exam_heavy"), Some(1.0));
        assert_eq!(lower.get("total_assessments"), Some(6.0));
        assert_eq!(lower.get("is_upper_div"), Some(0.0));
        assert!(!lower.contains("pct_exams"));

        let upper = db.course_features(3).await.unwrap().unwrap();
        assert_eq!(upper.get("is_upper_div"), Some(1.0));
        assert_eq!(upper.get("pct_exams"), Some(60.0));

        assert!(db.course_features(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_course_averages_parses_names() {
        let db = seeded().await;
        let names = vec![
            "COMPSCI 61A".to_string(),
            "DATA C8".to_string(),
            "MATH 1A".to_string(),
            "COMPSCI".to_string(),
            "PHYSICS 7A".to_string(),
        ];
        let averages = db.course_averages(&names).await.unwrap();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages["COMPSCI 61A"], 3.1);
        assert_eq!(averages["DATA C8"], 3.4);
    }

    #[tokio::test]
    async fn test_course_info() {
        let db = seeded().await;
        let info = db.course_info(2).await.unwrap().unwrap();
        assert_eq!(info.full_name, "DATA C8");
        assert_eq!(info.avg_gpa, Some(3.4));
        assert!(db.course_info(42).await.unwrap().is_none());
    }
}
