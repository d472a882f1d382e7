use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, Plan, ResultEngine, plans};

use super::{Engine, normalize_required_name};

pub(super) async fn find_plan<C: ConnectionTrait>(db: &C, plan_id: Uuid) -> ResultEngine<Plan> {
    let model = plans::Entity::find_by_id(plan_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::NotFound("plan not exists".to_string()))?;
    Plan::try_from(model)
}

impl Engine {
    pub async fn create_plan(
        &self,
        name: &str,
        price: MoneyCents,
        validity_days: u32,
        daily_return: MoneyCents,
    ) -> ResultEngine<Plan> {
        let name = normalize_required_name(name, "plan name")?;
        let plan = Plan::new(name, price, validity_days, daily_return)?;
        plans::ActiveModel::try_from(&plan)?
            .insert(&self.database)
            .await?;
        tracing::info!(plan_id = %plan.id, name = %plan.name, price = %plan.price, "plan created");
        Ok(plan)
    }

    pub async fn plan(&self, plan_id: Uuid) -> ResultEngine<Plan> {
        find_plan(&self.database, plan_id).await
    }

    /// All plans, active first, then by price.
    pub async fn plans(&self) -> ResultEngine<Vec<Plan>> {
        plans::Entity::find()
            .order_by_desc(plans::Column::Active)
            .order_by_asc(plans::Column::PriceMinor)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Plan::try_from)
            .collect()
    }

    /// Inactive plans cannot be bought. Running subscriptions are unaffected.
    pub async fn set_plan_active(&self, plan_id: Uuid, active: bool) -> ResultEngine<()> {
        let res = plans::Entity::update_many()
            .col_expr(plans::Column::Active, Expr::value(active))
            .filter(plans::Column::Id.eq(plan_id.to_string()))
            .exec(&self.database)
            .await?;
        if res.rows_affected == 0 {
            return Err(EngineError::NotFound("plan not exists".to_string()));
        }
        tracing::info!(%plan_id, active, "plan state changed");
        Ok(())
    }
}
