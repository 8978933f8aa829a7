//! Cross-store eviction: free the oldest records, regardless of record
//! type, until a byte target is met.

use crate::arena::Arena;
use crate::store::Evictable;

/// Repeatedly evicts the oldest front-of-list record across `stores`
/// (ties broken by the stores' given order, i.e. history before discovery
/// before autoreg) until at least `target` bytes have been freed.
///
/// Returns `Ok(())` once the target is met, `Err(())` if all stores go
/// empty first.
pub fn make_room(stores: &mut [&mut dyn Evictable], mut target: usize, arena: &mut Arena) -> Result<(), ()> {
    while target > 0 {
        let Some(victim) = stores
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| s.peek_front_clock().map(|clock| (idx, clock)))
            .min_by_key(|&(idx, clock)| (clock, idx))
            .map(|(idx, _)| idx)
        else {
            return Err(());
        };

        let freed = stores[victim]
            .evict_front(arena)
            .expect("peeked store must have a front to evict");
        target = target.saturating_sub(freed);
    }
    Ok(())
}
