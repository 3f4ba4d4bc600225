//! Fixed-capacity open-addressing hash table with group probing.
//!
//! Keys live in 16-slot groups, each with a parallel array of 16 control
//! bytes. A 64-bit xxHash is split into a 7-bit tag (stored in the control
//! byte and compared 16-at-a-time, with SSE2 on x86_64) and 57 position bits
//! that pick the starting group by modulo; probing is linear over groups, so
//! the capacity does not need to be a power of two. A probe stops at the
//! first group containing an empty slot; erasure therefore tombstones a slot
//! only when its group has no empty slot left.
//!
//! The table has no internal locking; callers synchronize externally.

use std::hash::{Hash, Hasher};
use std::mem::{self, MaybeUninit};

use xxhash_rust::xxh64::Xxh64;

const GROUP_WIDTH: usize = 16;

const CTRL_EMPTY: u8 = 0x80;
const CTRL_DELETED: u8 = 0xFF;
const CTRL_FULL_MASK: u8 = 0x7F;

/// Bitmask of slots within one group whose control byte equals `byte`.
#[cfg(target_arch = "x86_64")]
#[inline]
fn match_byte(ctrls: &[u8; GROUP_WIDTH], byte: u8) -> u16 {
    // SAFETY: SSE2 is baseline on x86_64; the load is unaligned-safe.
    unsafe {
        use std::arch::x86_64::*;
        let group = _mm_loadu_si128(ctrls.as_ptr() as *const __m128i);
        let hits = _mm_cmpeq_epi8(group, _mm_set1_epi8(byte as i8));
        _mm_movemask_epi8(hits) as u16
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn match_byte(ctrls: &[u8; GROUP_WIDTH], byte: u8) -> u16 {
    let mut mask = 0u16;
    for (i, &ctrl) in ctrls.iter().enumerate() {
        if ctrl == byte {
            mask |= 1 << i;
        }
    }
    mask
}

/// Bitmask of slots that are empty or tombstoned (control high bit set).
#[cfg(target_arch = "x86_64")]
#[inline]
fn match_vacant(ctrls: &[u8; GROUP_WIDTH]) -> u16 {
    // SAFETY: as in match_byte.
    unsafe {
        use std::arch::x86_64::*;
        let group = _mm_loadu_si128(ctrls.as_ptr() as *const __m128i);
        _mm_movemask_epi8(group) as u16
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn match_vacant(ctrls: &[u8; GROUP_WIDTH]) -> u16 {
    let mut mask = 0u16;
    for (i, &ctrl) in ctrls.iter().enumerate() {
        if ctrl & 0x80 != 0 {
            mask |= 1 << i;
        }
    }
    mask
}

fn split_hash<K: Hash>(key: &K) -> (u8, u64) {
    let mut hasher = Xxh64::new(0);
    key.hash(&mut hasher);
    let raw = hasher.finish();
    ((raw as u8) & CTRL_FULL_MASK, raw >> 7)
}

struct Group<K> {
    ctrls: [u8; GROUP_WIDTH],
    keys: [MaybeUninit<K>; GROUP_WIDTH],
}

pub struct HashTable<K, V> {
    groups: Box<[Group<K>]>,
    values: Box<[MaybeUninit<V>]>,
    slots: usize,
    used: usize,
}

impl<K: Copy + Eq + Hash, V> HashTable<K, V> {
    /// Builds a table able to hold `capacity` entries at a ~75% load factor;
    /// the slot count is padded accordingly and fixed for the table's life.
    pub fn with_capacity(capacity: usize) -> HashTable<K, V> {
        assert!(capacity > 0, "hash table capacity must be at least 1");

        let padded = capacity * 4 / 3 + 15;
        let groups_len = padded / GROUP_WIDTH;
        let slots = groups_len * GROUP_WIDTH;

        let groups = (0..groups_len)
            .map(|_| Group {
                ctrls: [CTRL_EMPTY; GROUP_WIDTH],
                keys: [MaybeUninit::uninit(); GROUP_WIDTH],
            })
            .collect();
        let values = (0..slots).map(|_| MaybeUninit::uninit()).collect();

        HashTable {
            groups,
            values,
            slots,
            used: 0,
        }
    }

    /// Inserts `value` under `key`, returning a reference to the stored
    /// value. An existing entry for the same key is replaced.
    ///
    /// # Panics
    ///
    /// Panics when every slot is occupied; the table never grows.
    pub fn insert(&mut self, key: K, value: V) -> &mut V {
        assert!(
            self.used < self.slots,
            "hash table full: {} slots occupied",
            self.slots
        );

        let (tag, position) = split_hash(&key);
        let start = (position % self.groups.len() as u64) as usize;
        let mut group_index = start;

        loop {
            let group = &mut self.groups[group_index];

            // Existing key wins over the first vacant slot.
            let mut hits = match_byte(&group.ctrls, tag);
            while hits != 0 {
                let i = hits.trailing_zeros() as usize;
                hits &= hits - 1;
                // SAFETY: a full control byte means keys[i] is initialized.
                if unsafe { group.keys[i].assume_init() } == key {
                    let slot = group_index * GROUP_WIDTH + i;
                    // SAFETY: full slot implies an initialized value.
                    unsafe {
                        self.values[slot].assume_init_drop();
                        return self.values[slot].write(value);
                    }
                }
            }

            // First empty or tombstoned slot in the group takes the entry.
            let vacant = match_vacant(&group.ctrls);
            if vacant != 0 {
                let i = vacant.trailing_zeros() as usize;
                group.ctrls[i] = tag;
                group.keys[i].write(key);
                self.used += 1;
                let slot = group_index * GROUP_WIDTH + i;
                return self.values[slot].write(value);
            }

            group_index = (group_index + 1) % self.groups.len();
            assert!(
                group_index != start,
                "hash table probe wrapped without finding a slot"
            );
        }
    }

    pub fn find(&self, key: &K) -> Option<&V> {
        self.find_slot(key)
            // SAFETY: find_slot only reports initialized slots.
            .map(|slot| unsafe { self.values[slot].assume_init_ref() })
    }

    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find_slot(key)
            // SAFETY: as above.
            .map(|slot| unsafe { self.values[slot].assume_init_mut() })
    }

    pub fn contains(&self, key: &K) -> bool {
        self.find_slot(key).is_some()
    }

    fn find_slot(&self, key: &K) -> Option<usize> {
        let (tag, position) = split_hash(key);
        let start = (position % self.groups.len() as u64) as usize;
        let mut group_index = start;

        loop {
            let group = &self.groups[group_index];

            let mut hits = match_byte(&group.ctrls, tag);
            while hits != 0 {
                let i = hits.trailing_zeros() as usize;
                hits &= hits - 1;
                // SAFETY: full control byte implies initialized key.
                if unsafe { group.keys[i].assume_init() } == *key {
                    return Some(group_index * GROUP_WIDTH + i);
                }
            }

            // An empty slot proves the key was never displaced past this
            // group. Tombstones do not stop the probe.
            if match_byte(&group.ctrls, CTRL_EMPTY) != 0 {
                return None;
            }

            group_index = (group_index + 1) % self.groups.len();
            if group_index == start {
                return None;
            }
        }
    }

    /// Removes `key`, returning whether an entry existed.
    pub fn erase(&mut self, key: &K) -> bool {
        let (tag, position) = split_hash(key);
        let start = (position % self.groups.len() as u64) as usize;
        let mut group_index = start;

        loop {
            let group = &mut self.groups[group_index];
            let empties = match_byte(&group.ctrls, CTRL_EMPTY);

            let mut hits = match_byte(&group.ctrls, tag);
            while hits != 0 {
                let i = hits.trailing_zeros() as usize;
                hits &= hits - 1;
                // SAFETY: full control byte implies initialized key.
                if unsafe { group.keys[i].assume_init() } == *key {
                    self.used -= 1;
                    // A tombstone is only needed when a later probe could
                    // still have to walk through this group.
                    group.ctrls[i] = if empties == 0 { CTRL_DELETED } else { CTRL_EMPTY };
                    let slot = group_index * GROUP_WIDTH + i;
                    // SAFETY: the slot was full until this point.
                    unsafe { self.values[slot].assume_init_drop() };
                    return true;
                }
            }

            if empties != 0 {
                return false;
            }

            group_index = (group_index + 1) % self.groups.len();
            if group_index == start {
                return false;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}

impl<K, V> Drop for HashTable<K, V> {
    fn drop(&mut self) {
        if !mem::needs_drop::<V>() {
            return;
        }
        for (gi, group) in self.groups.iter().enumerate() {
            for (i, &ctrl) in group.ctrls.iter().enumerate() {
                if ctrl & 0x80 == 0 {
                    // SAFETY: full slots hold initialized values.
                    unsafe { self.values[gi * GROUP_WIDTH + i].assume_init_drop() };
                }
            }
        }
    }
}
