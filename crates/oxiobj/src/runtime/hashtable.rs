//! Open-addressing hash table used by every runtime registry.
//!
//! The class table, selector table, per-class method tables and the weak
//! reference table are all [`Hashtable`]s. Keys are hashed and compared by
//! plain function pointers chosen at construction, so the same table type
//! serves string keys, interned handles and raw addresses without a
//! `Hash`/`Eq` bound.
//!
//! # Layout
//!
//! - Capacity is always a power of two, so the home bucket is
//!   `hash & (capacity - 1)`.
//! - Collisions resolve by linear probing.
//! - Deleting leaves a tombstone so later probe chains stay intact. A
//!   tombstone is reused by the next insert that passes over it.
//! - The table doubles when occupied buckets plus tombstones would exceed
//!   three quarters of the capacity. Growing rehashes only live entries,
//!   which also discards every tombstone. The table never shrinks.
//!
//! # Thread Safety
//!
//! `Hashtable` itself is not synchronized. The runtime wraps each instance
//! in the lock that protects the structure it belongs to.

use crate::error::{Error, Result};
use crate::runtime::fatal::unwrap_or_fatal;
use std::fmt;
use std::mem;

/// Hash function for table keys.
pub type HashFn<K> = fn(&K) -> u32;

/// Equality function for table keys.
pub type EqualFn<K> = fn(&K, &K) -> bool;

const MIN_CAPACITY: usize = 8;

enum Bucket<K, V> {
    Empty,
    Deleted,
    Full { hash: u32, key: K, value: V },
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

/// Hash table with caller-supplied hash and equality functions.
pub struct Hashtable<K, V> {
    buckets: Vec<Bucket<K, V>>,
    len: usize,
    tombstones: usize,
    hash: HashFn<K>,
    equal: EqualFn<K>,
}

/// Hashes a string with `FxHash`, folded to 32 bits.
#[must_use]
pub fn hash_str(s: &str) -> u32 {
    fxhash::hash32(&s)
}

/// Hashes an address. Low alignment bits are mixed in by `FxHash`.
#[must_use]
pub fn hash_ptr(addr: usize) -> u32 {
    fxhash::hash32(&addr)
}

impl<K, V> Hashtable<K, V> {
    /// Creates an empty table with the minimum capacity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the bucket array cannot be allocated.
    pub fn new(hash: HashFn<K>, equal: EqualFn<K>) -> Result<Self> {
        Ok(Hashtable {
            buckets: Self::alloc_buckets(MIN_CAPACITY)?,
            len: 0,
            tombstones: 0,
            hash,
            equal,
        })
    }

    /// Creates an empty table able to hold `capacity` entries before growing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the bucket array cannot be allocated.
    pub fn with_capacity(
        hash: HashFn<K>,
        equal: EqualFn<K>,
        capacity: usize,
    ) -> Result<Self> {
        // Room for `capacity` entries under the 3/4 load limit.
        let wanted = capacity
            .checked_mul(4)
            .map(|n| n / 3 + 1)
            .and_then(usize::checked_next_power_of_two)
            .ok_or(Error::OutOfMemory)?
            .max(MIN_CAPACITY);

        Ok(Hashtable {
            buckets: Self::alloc_buckets(wanted)?,
            len: 0,
            tombstones: 0,
            hash,
            equal,
        })
    }

    fn alloc_buckets(capacity: usize) -> Result<Vec<Bucket<K, V>>> {
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        buckets.resize_with(capacity, || Bucket::Empty);
        Ok(buckets)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Number of buckets holding a tombstone.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    fn probe(&self, hash: u32, key: &K) -> Probe {
        let mask = self.mask();
        let mut index = hash as usize & mask;
        let mut first_deleted = None;

        // The load limit guarantees at least one empty bucket.
        loop {
            match &self.buckets[index] {
                Bucket::Empty => {
                    return Probe::Vacant(first_deleted.unwrap_or(index));
                }
                Bucket::Deleted => {
                    first_deleted.get_or_insert(index);
                }
                Bucket::Full { hash: h, key: k, .. } => {
                    if *h == hash && (self.equal)(k, key) {
                        return Probe::Found(index);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Inserts or overwrites `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the table needed to grow and the
    /// larger bucket array could not be allocated. The table is unchanged
    /// in that case.
    pub fn try_set(&mut self, key: K, value: V) -> Result<Option<V>> {
        let hash = (self.hash)(&key);

        if let Probe::Found(index) = self.probe(hash, &key)
            && let Bucket::Full { value: slot, .. } = &mut self.buckets[index]
        {
            return Ok(Some(mem::replace(slot, value)));
        }

        if (self.len + self.tombstones + 1) * 4 > self.capacity() * 3 {
            self.grow()?;
        }

        let Probe::Vacant(index) = self.probe(hash, &key) else {
            unreachable!("key appeared during growth");
        };
        if matches!(self.buckets[index], Bucket::Deleted) {
            self.tombstones -= 1;
        }
        self.buckets[index] = Bucket::Full { hash, key, value };
        self.len += 1;
        Ok(None)
    }

    /// Inserts or overwrites `key`, returning the previous value.
    ///
    /// Allocation failure while growing is fatal.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        unwrap_or_fatal(self.try_set(key, value))
    }

    // Mostly tombstones: rehash at the same size instead of doubling.
    fn grow(&mut self) -> Result<()> {
        let capacity = if (self.len + 1) * 2 <= self.capacity() {
            self.capacity()
        } else {
            self.capacity().checked_mul(2).ok_or(Error::OutOfMemory)?
        };
        let old = mem::replace(&mut self.buckets, Self::alloc_buckets(capacity)?);
        let mask = capacity - 1;

        for bucket in old {
            if let Bucket::Full { hash, key, value } = bucket {
                let mut index = hash as usize & mask;
                while !matches!(self.buckets[index], Bucket::Empty) {
                    index = (index + 1) & mask;
                }
                self.buckets[index] = Bucket::Full { hash, key, value };
            }
        }

        self.tombstones = 0;
        Ok(())
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        match self.probe((self.hash)(key), key) {
            Probe::Found(index) => match &self.buckets[index] {
                Bucket::Full { value, .. } => Some(value),
                _ => None,
            },
            Probe::Vacant(_) => None,
        }
    }

    /// Looks up an entry by precomputed `hash` and a key predicate.
    ///
    /// Lets callers search with a borrowed form of the key, for example a
    /// short-lived `&str` against `&'static str` keys. `hash` must equal
    /// what the table's hash function returns for a matching key.
    pub fn find(&self, hash: u32, mut matches: impl FnMut(&K) -> bool) -> Option<&V> {
        let mask = self.mask();
        let mut index = hash as usize & mask;

        loop {
            match &self.buckets[index] {
                Bucket::Empty => return None,
                Bucket::Deleted => {}
                Bucket::Full { hash: h, key, value } => {
                    if *h == hash && matches(key) {
                        return Some(value);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Returns a mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        match self.probe((self.hash)(key), key) {
            Probe::Found(index) => match &mut self.buckets[index] {
                Bucket::Full { value, .. } => Some(value),
                _ => None,
            },
            Probe::Vacant(_) => None,
        }
    }

    /// Returns `true` if `key` has a live entry.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`, leaving a tombstone, and returns its value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let Probe::Found(index) = self.probe((self.hash)(key), key) else {
            return None;
        };

        match mem::replace(&mut self.buckets[index], Bucket::Deleted) {
            Bucket::Full { value, .. } => {
                self.len -= 1;
                self.tombstones += 1;
                Some(value)
            }
            _ => unreachable!("probe reported a live bucket"),
        }
    }

    /// Iterates over live entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets.iter().filter_map(|bucket| match bucket {
            Bucket::Full { key, value, .. } => Some((key, value)),
            _ => None,
        })
    }

    /// Iterates over live values in bucket order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Hashtable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
