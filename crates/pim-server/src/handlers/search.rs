//! Search-result command (§4.7 "Search-result"): an agent reports the
//! remote ids it found for an in-flight search, keyed by a correlation id
//! chosen by whoever issued the search. Resolves them to UIDs and pushes
//! the set to [`crate::search::SearchTaskRegistry`]; a lookup failure for
//! any one remote id fails the whole push so waiters see an empty set
//! rather than a partial one.

use pim_protocol::{Response, SearchResultCommand};

use crate::error::HandlerError;
use crate::handlers::HandlerContext;

pub async fn search_result(hctx: &HandlerContext<'_>, cmd: SearchResultCommand) -> Result<Vec<Response>, HandlerError> {
    let mut ids = Vec::with_capacity(cmd.remote_ids.len());
    let mut lookup_failed = false;
    for rid in &cmd.remote_ids {
        match hctx
            .ctx
            .store
            .find_item_by_remote_id(&cmd.resource, &pim_model::RemoteId(rid.clone()))
            .await?
        {
            Some(item) => ids.push(item.id),
            None => {
                lookup_failed = true;
                break;
            }
        }
    }

    if lookup_failed {
        hctx.ctx.search_tasks.fail(&cmd.search_id);
    } else {
        hctx.ctx.search_tasks.push(&cmd.search_id, ids);
    }
    Ok(Vec::new())
}
