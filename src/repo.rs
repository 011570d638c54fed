use crate::models::*;
use crate::permissions::{Catalog, SeedSummary};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    /// A foreign key points at a row that does not exist.
    #[error("integrity violation: {0}")] Integrity(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait ChannelRepo: Send + Sync {
    async fn list_channels(&self) -> RepoResult<Vec<Channel>>;
    async fn list_child_channels(&self, parent_id: Id) -> RepoResult<Vec<Channel>>;
    async fn get_channel(&self, id: Id) -> RepoResult<Channel>;
    async fn create_channel(&self, new: NewChannel) -> RepoResult<Channel>;
    async fn update_channel(&self, id: Id, upd: UpdateChannel) -> RepoResult<Channel>;
    /// Deletes the channel with its threads and their answers; children are detached.
    async fn delete_channel(&self, id: Id) -> RepoResult<()>;
    /// Moves a channel to a new primary key, carrying threads and children along.
    async fn rekey_channel(&self, id: Id, new_id: Id) -> RepoResult<Channel>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn list_threads(&self, filter: ThreadFilter) -> RepoResult<Vec<Thread>>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    async fn update_thread(&self, id: Id, upd: UpdateThread) -> RepoResult<Thread>;
    async fn set_best_answer(&self, id: Id, answer_id: Option<Id>) -> RepoResult<Thread>;
    async fn delete_thread(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait AnswerRepo: Send + Sync {
    async fn list_answers(&self, thread_id: Id) -> RepoResult<Vec<Answer>>;
    async fn get_answer(&self, id: Id) -> RepoResult<Answer>;
    async fn create_answer(&self, new: NewAnswer) -> RepoResult<Answer>;
    /// Also clears the thread's best answer when it pointed at this answer.
    async fn delete_answer(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn set_blocked(&self, id: Id, blocked: bool) -> RepoResult<User>;
    async fn is_blocked(&self, id: Id) -> RepoResult<bool>;
    /// Deletes the user with their threads, answers and grants.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
    async fn rekey_user(&self, id: Id, new_id: Id) -> RepoResult<User>;
}

#[async_trait]
pub trait PermissionRepo: Send + Sync {
    async fn seed_roles_and_permissions(&self, catalog: &Catalog) -> RepoResult<SeedSummary>;
    async fn list_roles(&self) -> RepoResult<Vec<Role>>;
    async fn list_permissions(&self) -> RepoResult<Vec<Permission>>;
    /// Idempotent; `NotFound` when the user or role does not exist.
    async fn assign_role(&self, user_id: Id, role: &str) -> RepoResult<()>;
    /// Direct grant bypassing roles; idempotent.
    async fn give_permission(&self, user_id: Id, permission: &str) -> RepoResult<()>;
    async fn user_roles(&self, user_id: Id) -> RepoResult<Vec<String>>;
    /// Direct grants plus everything reachable through roles, sorted and deduplicated.
    async fn user_permissions(&self, user_id: Id) -> RepoResult<Vec<String>>;
    async fn has_permission(&self, user_id: Id, permission: &str) -> RepoResult<bool>;
}

pub trait Repo: ChannelRepo + ThreadRepo + AnswerRepo + UserRepo + PermissionRepo {}

impl<T> Repo for T where T: ChannelRepo + ThreadRepo + AnswerRepo + UserRepo + PermissionRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    #[derive(Default)]
    struct State {
        users: BTreeMap<Id, User>,
        channels: BTreeMap<Id, Channel>,
        threads: BTreeMap<Id, Thread>,
        answers: BTreeMap<Id, Answer>,
        roles: BTreeMap<Id, Role>,
        permissions: BTreeMap<Id, Permission>,
        role_permissions: BTreeSet<(Id, Id)>, // (role, permission)
        user_roles: BTreeSet<(Id, Id)>,       // (user, role)
        user_permissions: BTreeSet<(Id, Id)>, // (user, permission)
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn role_id(&self, name: &str) -> Option<Id> {
            self.roles.values().find(|r| r.name == name).map(|r| r.id)
        }

        fn permission_id(&self, name: &str) -> Option<Id> {
            self.permissions.values().find(|p| p.name == name).map(|p| p.id)
        }

        fn ensure_permission(&mut self, name: &str, created: &mut usize) -> Id {
            if let Some(id) = self.permission_id(name) {
                return id;
            }
            let id = self.next_id();
            self.permissions.insert(id, Permission { id, name: name.to_string() });
            *created += 1;
            id
        }

        // cascade: a thread takes its answers with it
        fn remove_thread(&mut self, id: Id) -> bool {
            let existed = self.threads.remove(&id).is_some();
            self.answers.retain(|_, a| a.thread_id != id);
            existed
        }

        fn remove_answer(&mut self, id: Id) -> Option<Answer> {
            let answer = self.answers.remove(&id)?;
            if let Some(th) = self.threads.get_mut(&answer.thread_id) {
                if th.best_answer_id == Some(id) {
                    th.best_answer_id = None;
                }
            }
            Some(answer)
        }

        // keeps freshly allocated ids clear of manually chosen ones
        fn reserve_id(&mut self, id: Id) {
            if id > self.next_id {
                self.next_id = id;
            }
        }

        fn effective_permissions(&self, user_id: Id) -> BTreeSet<Id> {
            let mut out: BTreeSet<Id> = self
                .user_permissions
                .iter()
                .filter(|(u, _)| *u == user_id)
                .map(|(_, p)| *p)
                .collect();
            for (_, role) in self.user_roles.iter().filter(|(u, _)| *u == user_id) {
                out.extend(self.role_permissions.iter().filter(|(r, _)| r == role).map(|(_, p)| *p));
            }
            out
        }
    }

    /// Process-local store; every operation runs under one lock acquisition so cascades
    /// are never observed half-applied.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl ChannelRepo for InMemRepo {
        async fn list_channels(&self) -> RepoResult<Vec<Channel>> {
            let s = self.read()?;
            Ok(s.channels.values().cloned().collect())
        }
        async fn list_child_channels(&self, parent_id: Id) -> RepoResult<Vec<Channel>> {
            let s = self.read()?;
            Ok(s.channels.values().filter(|c| c.parent_id == Some(parent_id)).cloned().collect())
        }
        async fn get_channel(&self, id: Id) -> RepoResult<Channel> {
            let s = self.read()?;
            s.channels.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn create_channel(&self, new: NewChannel) -> RepoResult<Channel> {
            let mut s = self.write()?;
            if s.channels.values().any(|c| c.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            if let Some(parent) = new.parent_id {
                if !s.channels.contains_key(&parent) {
                    return Err(RepoError::Integrity(format!("parent channel {parent} does not exist")));
                }
            }
            let id = s.next_id();
            let now = Utc::now();
            let channel = Channel {
                id,
                name: new.name,
                slug: new.slug,
                parent_id: new.parent_id,
                created_at: now,
                updated_at: now,
            };
            s.channels.insert(id, channel.clone());
            Ok(channel)
        }
        async fn update_channel(&self, id: Id, upd: UpdateChannel) -> RepoResult<Channel> {
            let mut s = self.write()?;

            // uniqueness check before taking the mutable borrow
            if s.channels.values().any(|c| c.slug == upd.slug && c.id != id) {
                return Err(RepoError::Conflict);
            }

            let channel = s.channels.get_mut(&id).ok_or(RepoError::NotFound)?;
            channel.name = upd.name;
            channel.slug = upd.slug;
            channel.updated_at = Utc::now();
            Ok(channel.clone())
        }
        async fn delete_channel(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.channels.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            for child in s.channels.values_mut().filter(|c| c.parent_id == Some(id)) {
                child.parent_id = None;
            }
            let doomed: Vec<Id> = s.threads.values().filter(|t| t.channel_id == id).map(|t| t.id).collect();
            for thread_id in doomed {
                s.remove_thread(thread_id);
            }
            Ok(())
        }
        async fn rekey_channel(&self, id: Id, new_id: Id) -> RepoResult<Channel> {
            let mut s = self.write()?;
            if id != new_id && s.channels.contains_key(&new_id) {
                return Err(RepoError::Conflict);
            }
            let mut channel = s.channels.remove(&id).ok_or(RepoError::NotFound)?;
            channel.id = new_id;
            s.channels.insert(new_id, channel.clone());
            s.reserve_id(new_id);
            for child in s.channels.values_mut().filter(|c| c.parent_id == Some(id)) {
                child.parent_id = Some(new_id);
            }
            for th in s.threads.values_mut().filter(|t| t.channel_id == id) {
                th.channel_id = new_id;
            }
            Ok(channel)
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn list_threads(&self, filter: ThreadFilter) -> RepoResult<Vec<Thread>> {
            let s = self.read()?;
            let mut v: Vec<_> = s
                .threads
                .values()
                .filter(|t| filter.channel_id.map_or(true, |c| t.channel_id == c))
                .filter(|t| filter.include_unpublished || t.publish)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))); // latest first
            Ok(v)
        }
        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.read()?;
            s.threads.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            let mut s = self.write()?;
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::Integrity(format!("user {} does not exist", new.user_id)));
            }
            if !s.channels.contains_key(&new.channel_id) {
                return Err(RepoError::Integrity(format!("channel {} does not exist", new.channel_id)));
            }
            let id = s.next_id();
            let now = Utc::now();
            let thread = Thread {
                id,
                title: new.title,
                slug: new.slug,
                content: new.content,
                publish: new.publish,
                user_id: new.user_id,
                channel_id: new.channel_id,
                best_answer_id: None,
                created_at: now,
                updated_at: now,
            };
            s.threads.insert(id, thread.clone());
            Ok(thread)
        }
        async fn update_thread(&self, id: Id, upd: UpdateThread) -> RepoResult<Thread> {
            let mut s = self.write()?;
            if let Some(channel_id) = upd.channel_id {
                if !s.channels.contains_key(&channel_id) {
                    return Err(RepoError::Integrity(format!("channel {channel_id} does not exist")));
                }
            }
            let th = s.threads.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { th.title = title; }
            if let Some(slug) = upd.slug { th.slug = slug; }
            if let Some(content) = upd.content { th.content = content; }
            if let Some(channel_id) = upd.channel_id { th.channel_id = channel_id; }
            if let Some(publish) = upd.publish { th.publish = publish; }
            th.updated_at = Utc::now();
            Ok(th.clone())
        }
        async fn set_best_answer(&self, id: Id, answer_id: Option<Id>) -> RepoResult<Thread> {
            let mut s = self.write()?;
            let th = s.threads.get_mut(&id).ok_or(RepoError::NotFound)?;
            th.best_answer_id = answer_id;
            th.updated_at = Utc::now();
            Ok(th.clone())
        }
        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.remove_thread(id) { Ok(()) } else { Err(RepoError::NotFound) }
        }
    }

    #[async_trait]
    impl AnswerRepo for InMemRepo {
        async fn list_answers(&self, thread_id: Id) -> RepoResult<Vec<Answer>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.answers.values().filter(|a| a.thread_id == thread_id).cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))); // ascending
            Ok(v)
        }
        async fn get_answer(&self, id: Id) -> RepoResult<Answer> {
            let s = self.read()?;
            s.answers.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn create_answer(&self, new: NewAnswer) -> RepoResult<Answer> {
            let mut s = self.write()?;
            if !s.threads.contains_key(&new.thread_id) {
                return Err(RepoError::Integrity(format!("thread {} does not exist", new.thread_id)));
            }
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::Integrity(format!("user {} does not exist", new.user_id)));
            }
            let id = s.next_id();
            let now = Utc::now();
            let answer = Answer {
                id,
                content: new.content,
                thread_id: new.thread_id,
                user_id: new.user_id,
                created_at: now,
                updated_at: now,
            };
            s.answers.insert(id, answer.clone());
            Ok(answer)
        }
        async fn delete_answer(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            s.remove_answer(id).map(|_| ()).ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let now = Utc::now();
            let user = User {
                id,
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                is_blocked: false,
                created_at: now,
                updated_at: now,
            };
            s.users.insert(id, user.clone());
            Ok(user)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
            let s = self.read()?;
            s.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned().ok_or(RepoError::NotFound)
        }
        async fn set_blocked(&self, id: Id, blocked: bool) -> RepoResult<User> {
            let mut s = self.write()?;
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.is_blocked = blocked;
            user.updated_at = Utc::now();
            Ok(user.clone())
        }
        async fn is_blocked(&self, id: Id) -> RepoResult<bool> {
            let s = self.read()?;
            s.users.get(&id).map(|u| u.is_blocked).ok_or(RepoError::NotFound)
        }
        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.users.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            let doomed: Vec<Id> = s.threads.values().filter(|t| t.user_id == id).map(|t| t.id).collect();
            for thread_id in doomed {
                s.remove_thread(thread_id);
            }
            let answers: Vec<Id> = s.answers.values().filter(|a| a.user_id == id).map(|a| a.id).collect();
            for answer_id in answers {
                s.remove_answer(answer_id);
            }
            s.user_roles.retain(|(u, _)| *u != id);
            s.user_permissions.retain(|(u, _)| *u != id);
            Ok(())
        }
        async fn rekey_user(&self, id: Id, new_id: Id) -> RepoResult<User> {
            let mut s = self.write()?;
            if id != new_id && s.users.contains_key(&new_id) {
                return Err(RepoError::Conflict);
            }
            let mut user = s.users.remove(&id).ok_or(RepoError::NotFound)?;
            user.id = new_id;
            s.users.insert(new_id, user.clone());
            s.reserve_id(new_id);
            for th in s.threads.values_mut().filter(|t| t.user_id == id) {
                th.user_id = new_id;
            }
            for a in s.answers.values_mut().filter(|a| a.user_id == id) {
                a.user_id = new_id;
            }
            s.user_roles = s.user_roles.iter().map(|&(u, r)| (if u == id { new_id } else { u }, r)).collect();
            s.user_permissions = s.user_permissions.iter().map(|&(u, p)| (if u == id { new_id } else { u }, p)).collect();
            Ok(user)
        }
    }

    #[async_trait]
    impl PermissionRepo for InMemRepo {
        async fn seed_roles_and_permissions(&self, catalog: &Catalog) -> RepoResult<SeedSummary> {
            let mut s = self.write()?;
            let mut summary = SeedSummary::default();
            for name in &catalog.permissions {
                s.ensure_permission(name, &mut summary.permissions_created);
            }
            for grant in &catalog.roles {
                let role_id = match s.role_id(&grant.role) {
                    Some(id) => id,
                    None => {
                        let id = s.next_id();
                        s.roles.insert(id, Role { id, name: grant.role.clone() });
                        summary.roles_created += 1;
                        id
                    }
                };
                for name in &grant.permissions {
                    let perm_id = s.ensure_permission(name, &mut summary.permissions_created);
                    s.role_permissions.insert((role_id, perm_id));
                }
            }
            Ok(summary)
        }
        async fn list_roles(&self) -> RepoResult<Vec<Role>> {
            let s = self.read()?;
            Ok(s.roles.values().cloned().collect())
        }
        async fn list_permissions(&self) -> RepoResult<Vec<Permission>> {
            let s = self.read()?;
            Ok(s.permissions.values().cloned().collect())
        }
        async fn assign_role(&self, user_id: Id, role: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.users.contains_key(&user_id) {
                return Err(RepoError::NotFound);
            }
            let role_id = s.role_id(role).ok_or(RepoError::NotFound)?;
            s.user_roles.insert((user_id, role_id));
            Ok(())
        }
        async fn give_permission(&self, user_id: Id, permission: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.users.contains_key(&user_id) {
                return Err(RepoError::NotFound);
            }
            let perm_id = s.permission_id(permission).ok_or(RepoError::NotFound)?;
            s.user_permissions.insert((user_id, perm_id));
            Ok(())
        }
        async fn user_roles(&self, user_id: Id) -> RepoResult<Vec<String>> {
            let s = self.read()?;
            let mut names: Vec<String> = s
                .user_roles
                .iter()
                .filter(|(u, _)| *u == user_id)
                .filter_map(|(_, r)| s.roles.get(r).map(|r| r.name.clone()))
                .collect();
            names.sort();
            Ok(names)
        }
        async fn user_permissions(&self, user_id: Id) -> RepoResult<Vec<String>> {
            let s = self.read()?;
            let mut names: Vec<String> = s
                .effective_permissions(user_id)
                .iter()
                .filter_map(|p| s.permissions.get(p).map(|p| p.name.clone()))
                .collect();
            names.sort();
            Ok(names)
        }
        async fn has_permission(&self, user_id: Id, permission: &str) -> RepoResult<bool> {
            let s = self.read()?;
            Ok(match s.permission_id(permission) {
                Some(perm_id) => s.effective_permissions(user_id).contains(&perm_id),
                None => false,
            })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const USER_COLUMNS: &str = "id, name, email, password_hash, is_blocked, created_at, updated_at";
    const CHANNEL_COLUMNS: &str = "id, name, slug, parent_id, created_at, updated_at";
    const THREAD_COLUMNS: &str =
        "id, title, slug, content, publish, user_id, channel_id, best_answer_id, created_at, updated_at";
    const ANSWER_COLUMNS: &str = "id, content, thread_id, user_id, created_at, updated_at";

    fn map_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => RepoError::Conflict,            // unique_violation
                Some("23503") => RepoError::Integrity(db.message().to_string()), // foreign_key_violation
                _ => RepoError::Internal(db.message().to_string()),
            },
            other => RepoError::Internal(other.to_string()),
        }
    }

    fn affected(rows: u64) -> RepoResult<()> {
        if rows == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }

    /// Moves the `BIGSERIAL` sequence of `table` past `id`, never backwards.
    async fn advance_sequence(tx: &mut sqlx::Transaction<'_, Postgres>, table: &str, id: Id) -> RepoResult<()> {
        sqlx::query(&format!("SELECT setval('{table}_id_seq', GREATEST($1, last_value)) FROM {table}_id_seq"))
            .bind(id)
            .execute(&mut **tx).await.map_err(map_err)?;
        Ok(())
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Applies the bundled schema migrations.
        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl ChannelRepo for PgRepo {
        async fn list_channels(&self) -> RepoResult<Vec<Channel>> {
            sqlx::query_as::<_, Channel>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY id"))
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn list_child_channels(&self, parent_id: Id) -> RepoResult<Vec<Channel>> {
            sqlx::query_as::<_, Channel>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE parent_id = $1 ORDER BY id"))
                .bind(parent_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn get_channel(&self, id: Id) -> RepoResult<Channel> {
            sqlx::query_as::<_, Channel>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn create_channel(&self, new: NewChannel) -> RepoResult<Channel> {
            sqlx::query_as::<_, Channel>(&format!(
                "INSERT INTO channels (name, slug, parent_id) VALUES ($1, $2, $3) RETURNING {CHANNEL_COLUMNS}"
            ))
            .bind(&new.name).bind(&new.slug).bind(new.parent_id)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn update_channel(&self, id: Id, upd: UpdateChannel) -> RepoResult<Channel> {
            sqlx::query_as::<_, Channel>(&format!(
                "UPDATE channels SET name = $2, slug = $3, updated_at = now() WHERE id = $1 RETURNING {CHANNEL_COLUMNS}"
            ))
            .bind(id).bind(&upd.name).bind(&upd.slug)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_channel(&self, id: Id) -> RepoResult<()> {
            // threads and answers go through ON DELETE CASCADE, children through SET NULL
            let res = sqlx::query("DELETE FROM channels WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            affected(res.rows_affected())
        }
        async fn rekey_channel(&self, id: Id, new_id: Id) -> RepoResult<Channel> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let channel = sqlx::query_as::<_, Channel>(&format!(
                "UPDATE channels SET id = $2, updated_at = now() WHERE id = $1 RETURNING {CHANNEL_COLUMNS}"
            ))
            .bind(id).bind(new_id)
            .fetch_one(&mut *tx).await.map_err(map_err)?;
            advance_sequence(&mut tx, "channels", new_id).await?;
            tx.commit().await.map_err(map_err)?;
            Ok(channel)
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn list_threads(&self, filter: ThreadFilter) -> RepoResult<Vec<Thread>> {
            sqlx::query_as::<_, Thread>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads \
                 WHERE ($1::BIGINT IS NULL OR channel_id = $1) AND ($2 OR publish) \
                 ORDER BY created_at DESC, id DESC"
            ))
            .bind(filter.channel_id).bind(filter.include_unpublished)
            .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "INSERT INTO threads (title, slug, content, publish, user_id, channel_id) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {THREAD_COLUMNS}"
            ))
            .bind(&new.title).bind(&new.slug).bind(&new.content).bind(new.publish)
            .bind(new.user_id).bind(new.channel_id)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn update_thread(&self, id: Id, upd: UpdateThread) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "UPDATE threads SET title = COALESCE($2, title), slug = COALESCE($3, slug), \
                 content = COALESCE($4, content), channel_id = COALESCE($5, channel_id), \
                 publish = COALESCE($6, publish), updated_at = now() \
                 WHERE id = $1 RETURNING {THREAD_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.title.as_ref())
            .bind(upd.slug.as_ref())
            .bind(upd.content.as_ref())
            .bind(upd.channel_id)
            .bind(upd.publish)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn set_best_answer(&self, id: Id, answer_id: Option<Id>) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "UPDATE threads SET best_answer_id = $2, updated_at = now() WHERE id = $1 RETURNING {THREAD_COLUMNS}"
            ))
            .bind(id).bind(answer_id)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM threads WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            affected(res.rows_affected())
        }
    }

    #[async_trait]
    impl AnswerRepo for PgRepo {
        async fn list_answers(&self, thread_id: Id) -> RepoResult<Vec<Answer>> {
            sqlx::query_as::<_, Answer>(&format!(
                "SELECT {ANSWER_COLUMNS} FROM answers WHERE thread_id = $1 ORDER BY created_at ASC, id ASC"
            ))
            .bind(thread_id)
            .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn get_answer(&self, id: Id) -> RepoResult<Answer> {
            sqlx::query_as::<_, Answer>(&format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn create_answer(&self, new: NewAnswer) -> RepoResult<Answer> {
            sqlx::query_as::<_, Answer>(&format!(
                "INSERT INTO answers (content, thread_id, user_id) VALUES ($1, $2, $3) RETURNING {ANSWER_COLUMNS}"
            ))
            .bind(&new.content).bind(new.thread_id).bind(new.user_id)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_answer(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            sqlx::query("UPDATE threads SET best_answer_id = NULL WHERE best_answer_id = $1")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            let res = sqlx::query("DELETE FROM answers WHERE id = $1")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            affected(res.rows_affected())?;
            tx.commit().await.map_err(map_err)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!(
                "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
            ))
            .bind(&new.name).bind(&new.email).bind(&new.password_hash)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"))
                .bind(email)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn set_blocked(&self, id: Id, blocked: bool) -> RepoResult<User> {
            sqlx::query_as::<_, User>(&format!(
                "UPDATE users SET is_blocked = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
            ))
            .bind(id).bind(blocked)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn is_blocked(&self, id: Id) -> RepoResult<bool> {
            sqlx::query_scalar::<_, bool>("SELECT is_blocked FROM users WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            // answers by this user that are someone's best answer
            sqlx::query("UPDATE threads SET best_answer_id = NULL WHERE best_answer_id IN (SELECT id FROM answers WHERE user_id = $1)")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            let res = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            affected(res.rows_affected())?;
            tx.commit().await.map_err(map_err)
        }
        async fn rekey_user(&self, id: Id, new_id: Id) -> RepoResult<User> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let user = sqlx::query_as::<_, User>(&format!(
                "UPDATE users SET id = $2, updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
            ))
            .bind(id).bind(new_id)
            .fetch_one(&mut *tx).await.map_err(map_err)?;
            advance_sequence(&mut tx, "users", new_id).await?;
            tx.commit().await.map_err(map_err)?;
            Ok(user)
        }
    }

    #[async_trait]
    impl PermissionRepo for PgRepo {
        async fn seed_roles_and_permissions(&self, catalog: &Catalog) -> RepoResult<SeedSummary> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let mut summary = SeedSummary::default();
            let all_permissions = catalog
                .permissions
                .iter()
                .chain(catalog.roles.iter().flat_map(|g| g.permissions.iter()));
            for name in all_permissions {
                let res = sqlx::query("INSERT INTO permissions (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                    .bind(name)
                    .execute(&mut *tx).await.map_err(map_err)?;
                summary.permissions_created += res.rows_affected() as usize;
            }
            for grant in &catalog.roles {
                let res = sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                    .bind(&grant.role)
                    .execute(&mut *tx).await.map_err(map_err)?;
                summary.roles_created += res.rows_affected() as usize;
                for perm in &grant.permissions {
                    sqlx::query(
                        "INSERT INTO role_has_permissions (role_id, permission_id) \
                         SELECT r.id, p.id FROM roles r, permissions p WHERE r.name = $1 AND p.name = $2 \
                         ON CONFLICT DO NOTHING",
                    )
                    .bind(&grant.role).bind(perm)
                    .execute(&mut *tx).await.map_err(map_err)?;
                }
            }
            tx.commit().await.map_err(map_err)?;
            Ok(summary)
        }
        async fn list_roles(&self) -> RepoResult<Vec<Role>> {
            sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY id")
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn list_permissions(&self) -> RepoResult<Vec<Permission>> {
            sqlx::query_as::<_, Permission>("SELECT id, name FROM permissions ORDER BY id")
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn assign_role(&self, user_id: Id, role: &str) -> RepoResult<()> {
            let role_id = sqlx::query_scalar::<_, Id>("SELECT id FROM roles WHERE name = $1")
                .bind(role)
                .fetch_one(&self.pool).await.map_err(map_err)?;
            sqlx::query("INSERT INTO model_has_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user_id).bind(role_id)
                .execute(&self.pool).await
                .map_err(|e| match map_err(e) {
                    RepoError::Integrity(_) => RepoError::NotFound, // unknown user
                    other => other,
                })?;
            Ok(())
        }
        async fn give_permission(&self, user_id: Id, permission: &str) -> RepoResult<()> {
            let perm_id = sqlx::query_scalar::<_, Id>("SELECT id FROM permissions WHERE name = $1")
                .bind(permission)
                .fetch_one(&self.pool).await.map_err(map_err)?;
            sqlx::query("INSERT INTO model_has_permissions (user_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user_id).bind(perm_id)
                .execute(&self.pool).await
                .map_err(|e| match map_err(e) {
                    RepoError::Integrity(_) => RepoError::NotFound,
                    other => other,
                })?;
            Ok(())
        }
        async fn user_roles(&self, user_id: Id) -> RepoResult<Vec<String>> {
            sqlx::query_scalar::<_, String>(
                "SELECT r.name FROM model_has_roles mr JOIN roles r ON r.id = mr.role_id \
                 WHERE mr.user_id = $1 ORDER BY r.name",
            )
            .bind(user_id)
            .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn user_permissions(&self, user_id: Id) -> RepoResult<Vec<String>> {
            sqlx::query_scalar::<_, String>(
                "SELECT p.name FROM model_has_permissions mp JOIN permissions p ON p.id = mp.permission_id \
                 WHERE mp.user_id = $1 \
                 UNION \
                 SELECT p.name FROM model_has_roles mr \
                 JOIN role_has_permissions rp ON rp.role_id = mr.role_id \
                 JOIN permissions p ON p.id = rp.permission_id \
                 WHERE mr.user_id = $1 \
                 ORDER BY 1",
            )
            .bind(user_id)
            .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn has_permission(&self, user_id: Id, permission: &str) -> RepoResult<bool> {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS ( \
                   SELECT 1 FROM model_has_permissions mp JOIN permissions p ON p.id = mp.permission_id \
                   WHERE mp.user_id = $1 AND p.name = $2 \
                   UNION ALL \
                   SELECT 1 FROM model_has_roles mr \
                   JOIN role_has_permissions rp ON rp.role_id = mr.role_id \
                   JOIN permissions p ON p.id = rp.permission_id \
                   WHERE mr.user_id = $1 AND p.name = $2 \
                 )",
            )
            .bind(user_id).bind(permission)
            .fetch_one(&self.pool).await.map_err(map_err)
        }
    }
}
