use bytes::Bytes;

const MIN_CAPACITY: usize = 64;
const LOAD_HIGH_PERCENT: usize = 70;
const LOAD_LOW_PERCENT: usize = 20;

/// 32-bit FNV-1a over raw key bytes.
pub fn fnv1a(key: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in key {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

struct Occupied<V> {
    key: Bytes,
    hash: u32,
    value: V,
}

enum Slot<V> {
    Empty,
    /// Preserves probe continuity after a deletion. Counts toward the
    /// grow threshold but not toward `len`.
    Tombstone,
    Live(Occupied<V>),
}

/// Open-addressed hash map with Robin-Hood displacement and tombstones.
///
/// Capacity is always a power of two, with a floor of 64 slots. The table
/// grows to 2x when `(live + tombstones + 1) / capacity` exceeds 0.70 and
/// shrinks to half when `live / capacity` drops below 0.20; both rebuilds
/// clear tombstones. Each live slot caches the key's hash so rebuilds never
/// rehash.
///
/// Iterators walk slots in table order and are invalidated by any insert,
/// delete, or rebuild (the borrow checker enforces this).
pub struct HashTable<V> {
    slots: Vec<Slot<V>>,
    live: usize,
    tombstones: usize,
}

impl<V> HashTable<V> {
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cap = capacity.max(MIN_CAPACITY).next_power_of_two();
        Self {
            slots: (0..cap).map(|_| Slot::Empty).collect(),
            live: 0,
            tombstones: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current slot count.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts or replaces the value under `key`. Returns `true` when the
    /// key was not present before.
    pub fn insert(&mut self, key: Bytes, value: V) -> bool {
        if (self.live + self.tombstones + 1) * 100 > self.slots.len() * LOAD_HIGH_PERCENT {
            self.resize(self.slots.len() * 2);
        }

        let hash = fnv1a(&key);
        let cap = self.slots.len();
        let mask = cap - 1;

        let mut cand = Occupied { key, hash, value };
        let mut idx = (hash as usize) & mask;
        let mut dist = 0usize;

        loop {
            match &mut self.slots[idx] {
                Slot::Live(occ) => {
                    if occ.hash == cand.hash && occ.key == cand.key {
                        occ.value = cand.value;
                        return false;
                    }
                    // Robin Hood: displace the occupant once the candidate
                    // is further from its ideal slot, then keep walking with
                    // the displaced entry.
                    let occ_dist = (idx + cap - (occ.hash as usize & mask)) & mask;
                    if dist > occ_dist {
                        std::mem::swap(occ, &mut cand);
                        dist = occ_dist;
                    }
                }
                slot => {
                    if matches!(slot, Slot::Tombstone) {
                        self.tombstones -= 1;
                    }
                    *slot = Slot::Live(cand);
                    self.live += 1;
                    return true;
                }
            }
            idx = (idx + 1) & mask;
            dist += 1;
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let idx = self.find_idx(key)?;
        match &self.slots[idx] {
            Slot::Live(occ) => Some(&occ.value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let idx = self.find_idx(key)?;
        match &mut self.slots[idx] {
            Slot::Live(occ) => Some(&mut occ.value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find_idx(key).is_some()
    }

    /// Removes `key`, leaving a tombstone, and returns the stored value.
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let idx = self.find_idx(key)?;
        let value = match std::mem::replace(&mut self.slots[idx], Slot::Tombstone) {
            Slot::Live(occ) => occ.value,
            // find_idx only ever reports live slots
            _ => return None,
        };
        self.live -= 1;
        self.tombstones += 1;

        if self.slots.len() > MIN_CAPACITY && self.live * 100 < self.slots.len() * LOAD_LOW_PERCENT
        {
            self.resize(self.slots.len() / 2);
        }

        Some(value)
    }

    /// Iterates live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Live(occ) => Some((&occ.key, &occ.value)),
            _ => None,
        })
    }

    fn find_idx(&self, key: &[u8]) -> Option<usize> {
        let hash = fnv1a(key);
        let cap = self.slots.len();
        let mask = cap - 1;

        let mut idx = (hash as usize) & mask;
        let mut dist = 0usize;

        loop {
            match &self.slots[idx] {
                Slot::Empty => return None,
                // Tombstones keep the probe walk alive.
                Slot::Tombstone => {}
                Slot::Live(occ) => {
                    // Robin Hood guarantee: had the key been inserted, it
                    // would have displaced any occupant closer to home.
                    let occ_dist = (idx + cap - (occ.hash as usize & mask)) & mask;
                    if dist > occ_dist {
                        return None;
                    }
                    if occ.hash == hash && occ.key == key {
                        return Some(idx);
                    }
                }
            }
            idx = (idx + 1) & mask;
            dist += 1;
        }
    }

    fn resize(&mut self, new_cap: usize) {
        let new_cap = new_cap.max(MIN_CAPACITY);
        let old = std::mem::replace(
            &mut self.slots,
            (0..new_cap).map(|_| Slot::Empty).collect(),
        );
        self.tombstones = 0;

        let mask = new_cap - 1;
        for slot in old {
            if let Slot::Live(occ) = slot {
                Self::place(&mut self.slots, mask, occ);
            }
        }
    }

    /// Robin-Hood insertion for keys known to be absent, used by rebuilds.
    /// Entries are moved into the new slots without reallocating keys.
    fn place(slots: &mut [Slot<V>], mask: usize, mut cand: Occupied<V>) {
        let cap = mask + 1;
        let mut idx = (cand.hash as usize) & mask;
        let mut dist = 0usize;

        loop {
            match &mut slots[idx] {
                Slot::Live(occ) => {
                    let occ_dist = (idx + cap - (occ.hash as usize & mask)) & mask;
                    if dist > occ_dist {
                        std::mem::swap(occ, &mut cand);
                        dist = occ_dist;
                    }
                }
                slot => {
                    *slot = Slot::Live(cand);
                    return;
                }
            }
            idx = (idx + 1) & mask;
            dist += 1;
        }
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
