use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to statement timeout")
                || db
                    .message()
                    .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Zero affected rows on an owner-checked write means missing or foreign.
pub(super) fn expect_owned(rows_affected: u64) -> Result<(), RepoError> {
    if rows_affected == 0 {
        Err(RepoError::NotFoundOrForbidden)
    } else {
        Ok(())
    }
}

/// Zero affected rows on a toggle write means the prior state did not allow it.
pub(super) fn expect_transition(rows_affected: u64, message: &str) -> Result<(), RepoError> {
    if rows_affected == 0 {
        Err(RepoError::illegal(message))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn affected_row_guards() {
        assert!(expect_owned(1).is_ok());
        assert!(matches!(expect_owned(0), Err(RepoError::NotFoundOrForbidden)));
        assert!(matches!(
            expect_transition(0, "nope"),
            Err(RepoError::IllegalTransition { .. })
        ));
    }
}
