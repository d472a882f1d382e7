use sea_orm::{QueryFilter, QueryOrder, QuerySelect, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    Direction, EngineError, EntryStatus, LedgerEntry, LedgerSource, ResultEngine, ledger,
};

use super::{Engine, accounts::find_account};

/// Optional filters for [`Engine::ledger_entries`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub source: Option<LedgerSource>,
    pub direction: Option<Direction>,
    pub status: Option<EntryStatus>,
}

impl Engine {
    /// Ledger history of an account, newest first. `SUCCESS` entries are
    /// ordered by when they were posted; pending and failed holds by creation.
    pub async fn ledger_entries(
        &self,
        account_id: Uuid,
        filter: &LedgerFilter,
        limit: u64,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        if limit == 0 {
            return Err(EngineError::InvalidAmount(
                "limit must be > 0".to_string(),
            ));
        }
        find_account(&self.database, account_id).await?;

        let mut query =
            ledger::Entity::find().filter(ledger::Column::AccountId.eq(account_id.to_string()));
        if let Some(source) = filter.source {
            query = query.filter(ledger::Column::Source.eq(source.as_str()));
        }
        if let Some(direction) = filter.direction {
            query = query.filter(ledger::Column::Direction.eq(direction.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(ledger::Column::Status.eq(status.as_str()));
        }

        query
            .order_by_desc(Expr::cust("COALESCE(posted_at, created_at)"))
            .order_by_desc(ledger::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    /// Entries written because of `reference_id` (a subscription, a request).
    pub async fn ledger_entries_for_reference(
        &self,
        reference_id: Uuid,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        ledger::Entity::find()
            .filter(ledger::Column::ReferenceId.eq(reference_id.to_string()))
            .order_by_asc(ledger::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }
}
