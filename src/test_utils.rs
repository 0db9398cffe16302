use crate::database::activity::ActivityRepository;
use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::activity::{ActivityStats, NewActivity, UserActivity};
use crate::models::session::{ClientMeta, Session, TokenPair};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory stand-in for the Postgres repository, mirroring the SQL
/// semantics closely enough to exercise the lifecycle rules without a
/// database.
pub struct MemoryRepository {
    sessions: Mutex<Vec<Session>>,
    activities: Mutex<Vec<UserActivity>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            activities: Mutex::new(Vec::new()),
        }
    }

    /// Insert an activity with an explicit timestamp, for retention tests.
    pub async fn log_activity_at(&self, activity: &NewActivity, timestamp: DateTime<Utc>) -> Result<UserActivity, AppError> {
        let record = build_activity(activity, timestamp);
        self.activities.lock().unwrap().push(record.clone());
        Ok(record)
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn build_activity(activity: &NewActivity, timestamp: DateTime<Utc>) -> UserActivity {
    UserActivity {
        id: Uuid::new_v4(),
        user_id: activity.user_id,
        activity_type: activity.activity_type,
        description: activity.description.clone(),
        metadata: activity.metadata.clone(),
        ip_address: activity.ip_address.clone(),
        user_agent: activity.user_agent.clone(),
        location_country: activity.location_country.clone(),
        location_city: activity.location_city.clone(),
        location_region: activity.location_region.clone(),
        timestamp,
        created_at: timestamp,
    }
}

#[async_trait::async_trait]
impl SessionRepository for MemoryRepository {
    async fn create_session(&self, user_id: &Uuid, tokens: &TokenPair, expires_at: DateTime<Utc>, meta: &ClientMeta) -> Result<Session, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.iter().any(|s| s.token == tokens.token || s.refresh_token == tokens.refresh_token) {
            return Err(AppError::DuplicateToken);
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: *user_id,
            token: tokens.token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            user_agent: meta.user_agent.clone(),
            ip_address: meta.ip_address.clone(),
            is_active: true,
            expires_at,
            last_activity: now,
            created_at: now,
            updated_at: now,
        };
        sessions.push(session.clone());
        Ok(session)
    }

    async fn find_active_sessions(&self, user_id: &Uuid) -> Result<Vec<Session>, AppError> {
        let now = Utc::now();
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .filter(|s| s.user_id == *user_id && s.is_active && s.expires_at > now)
            .cloned()
            .collect())
    }

    async fn find_session_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Session>, AppError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.iter().find(|s| s.refresh_token == refresh_token).cloned())
    }

    async fn touch_session(&self, session_id: &Uuid) -> Result<Session, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == *session_id)
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        let now = Utc::now();
        session.last_activity = now;
        session.updated_at = now;
        Ok(session.clone())
    }

    async fn deactivate_session(&self, session_id: &Uuid) -> Result<Session, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == *session_id)
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        let now = Utc::now();
        session.is_active = false;
        session.last_activity = now;
        session.updated_at = now;
        Ok(session.clone())
    }

    async fn deactivate_all_user_sessions(&self, user_id: &Uuid) -> Result<u64, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        let now = Utc::now();
        let mut count = 0;
        for session in sessions.iter_mut().filter(|s| s.user_id == *user_id && s.is_active) {
            session.is_active = false;
            session.last_activity = now;
            session.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.expires_at >= now && s.is_active);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.expires_at >= now);
        Ok((before - sessions.len()) as u64)
    }
}

#[async_trait::async_trait]
impl ActivityRepository for MemoryRepository {
    async fn log_activity(&self, activity: &NewActivity) -> Result<UserActivity, AppError> {
        self.log_activity_at(activity, Utc::now()).await
    }

    async fn get_user_activities(&self, user_id: &Uuid, limit: i64, skip: i64) -> Result<Vec<UserActivity>, AppError> {
        let activities = self.activities.lock().unwrap();
        let mut page: Vec<UserActivity> = activities.iter().filter(|a| a.user_id == *user_id).cloned().collect();
        page.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(page.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn get_activity_stats(&self, user_id: &Uuid, days: i64) -> Result<Vec<ActivityStats>, AppError> {
        let since = Utc::now() - Duration::days(days);
        let activities = self.activities.lock().unwrap();

        let mut grouped: HashMap<_, (i64, DateTime<Utc>)> = HashMap::new();
        for activity in activities.iter().filter(|a| a.user_id == *user_id && a.timestamp >= since) {
            let entry = grouped.entry(activity.activity_type).or_insert((0, activity.timestamp));
            entry.0 += 1;
            if activity.timestamp > entry.1 {
                entry.1 = activity.timestamp;
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(activity_type, (count, last_activity))| ActivityStats {
                activity_type,
                count,
                last_activity,
            })
            .collect())
    }

    async fn delete_expired_activities(&self, retention_days: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut activities = self.activities.lock().unwrap();
        let before = activities.len();
        activities.retain(|a| a.timestamp >= cutoff);
        Ok((before - activities.len()) as u64)
    }
}
