use chrono::Utc;

use super::User;

pub const DEFAULT_PIC: &str =
    "https://icon-library.com/images/anonymous-avatar-icon/anonymous-avatar-icon-25.jpg";

#[derive(Clone)]
pub struct UserManager<'a> {
    pool: &'a sqlx::SqlitePool,
    cost: u32,
}

impl<'a> UserManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self {
            pool,
            cost: bcrypt::DEFAULT_COST,
        }
    }

    /// bcrypt work factor used when storing new passwords.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("User already exists")]
    EmailTaken,
    #[error("Invalid Email or Password")]
    WrongPassword,
    #[error(transparent)]
    HashError(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(ref e) if e.is_unique_violation() => Error::EmailTaken,
            _ => Error::DatabaseError(value),
        }
    }
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub pic: Option<&'a str>,
}

impl UserManager<'_> {
    /// Looks up `email` and checks `password` against the stored hash. An
    /// unknown email and a wrong password are indistinguishable to the caller.
    pub async fn get_user(&self, email: &str, password: &str) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM User WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool)
            .await?
            .ok_or(Error::WrongPassword)?;

        if bcrypt::verify(password, &user.password)? {
            Ok(user)
        } else {
            Err(Error::WrongPassword)
        }
    }

    pub async fn new_user(&self, new: NewUser<'_>) -> Result<User, Error> {
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT id FROM User WHERE email = ?)")
                .bind(new.email)
                .fetch_one(self.pool)
                .await?;
        if exists >= 1 {
            return Err(Error::EmailTaken);
        }

        let hash = bcrypt::hash(new.password, self.cost)?;
        let pic = new.pic.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PIC);
        let now = Utc::now();

        Ok(sqlx::query_as::<_, User>(
            "INSERT INTO User(name, email, password, pic, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(new.name)
        .bind(new.email)
        .bind(hash)
        .bind(pic)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM User WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await
    }

    /// Every user except `exclude` whose name or email contains `term`,
    /// ignoring case. No term matches everyone.
    pub async fn search_user(
        &self,
        term: Option<&str>,
        exclude: i64,
    ) -> Result<Vec<User>, sqlx::Error> {
        match term.filter(|t| !t.is_empty()) {
            Some(term) => {
                sqlx::query_as::<_, User>(
                    "SELECT * FROM User
                     WHERE id != ?
                       AND (instr(lower(name), lower(?)) > 0 OR instr(lower(email), lower(?)) > 0)
                     ORDER BY id",
                )
                .bind(exclude)
                .bind(term)
                .bind(term)
                .fetch_all(self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, User>("SELECT * FROM User WHERE id != ? ORDER BY id")
                    .bind(exclude)
                    .fetch_all(self.pool)
                    .await
            }
        }
    }
}
