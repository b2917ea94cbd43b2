use crate::config::MAX_WORKERS;
use crate::store::checkpoints::CheckpointStore;
use crate::store::{Credentials, FormDefinition};
use crate::sync::{FormOutcome, SyncContext, sync_form};
use anyhow::{Result, anyhow};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};
use std::thread;

/// Syncs forms on a bounded set of worker threads. Each worker owns its own
/// table connection; a single form is still processed sequentially. The
/// returned outcomes follow the input order.
pub(crate) fn sync_forms_pooled(
    ctx: &SyncContext,
    creds: &Credentials,
    forms: &[FormDefinition],
    workers: usize,
) -> Result<Vec<FormOutcome>> {
    let workers = workers.clamp(1, MAX_WORKERS).min(forms.len().max(1));
    let queue = Mutex::new(forms.iter().enumerate());
    let abort = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, FormOutcome)>();

    thread::scope(|scope| -> Result<()> {
        let handles = (0..workers)
            .map(|_| {
                let tx = tx.clone();
                let queue = &queue;
                let abort = &abort;
                scope.spawn(move || -> Result<()> {
                    let store = CheckpointStore::open(&ctx.cfg.table)?;
                    while !abort.load(Ordering::SeqCst) {
                        let next = queue
                            .lock()
                            .map_err(|_| anyhow!("form queue poisoned"))?
                            .next();
                        let Some((idx, form)) = next else {
                            break;
                        };
                        match sync_form(&store, ctx, creds, form) {
                            Ok(outcome) => tx
                                .send((idx, outcome))
                                .map_err(|_| anyhow!("form outcome channel closed"))?,
                            Err(err) => {
                                abort.store(true, Ordering::SeqCst);
                                return Err(err);
                            }
                        }
                    }
                    Ok(())
                })
            })
            .collect::<Vec<_>>();
        drop(tx);

        let mut first_err = None;
        for handle in handles {
            let res = handle
                .join()
                .unwrap_or_else(|_| Err(anyhow!("form worker panicked")));
            if let Err(err) = res
                && first_err.is_none()
            {
                first_err = Some(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    })?;

    let mut outcomes = rx.into_iter().collect::<Vec<_>>();
    outcomes.sort_by_key(|(idx, _)| *idx);
    Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
}
