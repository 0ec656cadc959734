//! Fixed-capacity ring of `u32` samples that can be parked in SHRAM.
//!
//! The buffer borrows its backing storage, so it can live in `.bss` or on
//! the stack. With [`Config::allow_overwrite`] set, a full buffer evicts its
//! oldest sample on append; otherwise the append is refused.
//!
//! Persisted layout at [`Config::shram_offset`], in words:
//!
//! ```text
//! +0  total appends
//! +4  length N
//! +8  N samples, oldest first
//! ```
//!
//! Loading replays the samples through the append path and only then
//! restores the persisted append counter, so eviction counting carries over
//! a shutdown.

use core::iter::FusedIterator;

use crate::console::Console;
use crate::regs::RegisterDriver;
use crate::shram::{self, Shram};

/// Circular buffer error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Append to a full buffer with overwrite disabled.
    Full,
    /// Remove or read on an empty buffer.
    Empty,
    /// Read beyond the capacity.
    OutOfRange { position: u32, len: u32 },
    /// No SHRAM offset was configured.
    NotPersistent,
    /// The persisted length does not fit this buffer.
    CorruptLength { len: u32 },
    Shram(shram::Error),
}

impl From<shram::Error> for Error {
    fn from(e: shram::Error) -> Self {
        Error::Shram(e)
    }
}

/// Callbacks for failed operations. All default to no-ops.
pub trait BufferHooks {
    fn full(&mut self) {}
    fn empty(&mut self) {}
    fn read_error(&mut self) {}
}

impl BufferHooks for () {}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Byte offset of the persisted image in SHRAM.
    pub shram_offset: Option<u32>,
    /// Evict the oldest sample instead of refusing an append when full.
    pub allow_overwrite: bool,
}

pub struct CircularBuffer<'a, H: BufferHooks = ()> {
    storage: &'a mut [u32],
    head: usize,
    tail: usize,
    full: bool,
    total_appends: u32,
    total_removes: u32,
    config: Config,
    hooks: H,
}

impl<'a, H: BufferHooks> CircularBuffer<'a, H> {
    /// Create an empty buffer over `storage`, whose length is the capacity.
    #[track_caller]
    pub fn new(storage: &'a mut [u32], config: Config, hooks: H) -> Self {
        assert!(!storage.is_empty(), "circular buffer needs a non-empty backing store");
        Self {
            storage,
            head: 0,
            tail: 0,
            full: false,
            total_appends: 0,
            total_removes: 0,
            config,
            hooks,
        }
    }

    /// Empty the buffer and zero both counters.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.full = false;
        self.total_appends = 0;
        self.total_removes = 0;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail && !self.full
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> u32 {
        self.storage.len() as u32
    }

    /// Number of samples held.
    pub fn len(&self) -> u32 {
        let len = if self.full {
            self.storage.len()
        } else if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.head + self.storage.len() - self.tail
        };
        len as u32
    }

    fn push(&mut self, item: u32) {
        let cap = self.storage.len();
        self.storage[self.head] = item;
        if self.full {
            self.tail = (self.tail + 1) % cap;
        }
        self.head = (self.head + 1) % cap;
        self.full = self.head == self.tail;
        self.total_appends = self.total_appends.wrapping_add(1);
    }

    /// Append `item` as the newest sample.
    pub fn append(&mut self, item: u32) -> Result<(), Error> {
        if self.full && !self.config.allow_overwrite {
            debug!("buffer full");
            self.hooks.full();
            return Err(Error::Full);
        }
        self.push(item);
        Ok(())
    }

    /// Take the oldest sample.
    pub fn remove(&mut self) -> Result<u32, Error> {
        if self.is_empty() {
            self.hooks.empty();
            return Err(Error::Empty);
        }
        let item = self.storage[self.tail];
        self.full = false;
        self.tail = (self.tail + 1) % self.storage.len();
        self.total_removes = self.total_removes.wrapping_add(1);
        Ok(item)
    }

    fn slot(&self, position: usize) -> u32 {
        self.storage[(self.tail + position) % self.storage.len()]
    }

    /// Sample at logical `position`, 0 being the oldest.
    ///
    /// Positions past [`len`](Self::len) but below the capacity return
    /// whatever the slot last held.
    pub fn read(&mut self, position: u32) -> Result<u32, Error> {
        if self.is_empty() {
            self.hooks.read_error();
            return Err(Error::Empty);
        }
        if position >= self.capacity() {
            self.hooks.read_error();
            return Err(Error::OutOfRange {
                position,
                len: self.len(),
            });
        }
        Ok(self.slot(position as usize))
    }

    pub fn total_appends(&self) -> u32 {
        self.total_appends
    }

    pub fn total_removes(&self) -> u32 {
        self.total_removes
    }

    /// Running sample number of the sample at `position`.
    pub fn sample_count(&self, position: u32) -> u32 {
        self.total_appends.wrapping_sub(self.len().wrapping_sub(position))
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            storage: &*self.storage,
            tail: self.tail,
            pos: 0,
            len: self.len() as usize,
        }
    }

    /// Copy the samples, oldest first, into `out`. Returns the count copied,
    /// which is short if `out` is smaller than the buffer.
    pub fn to_array(&self, out: &mut [u32]) -> usize {
        let mut n = 0;
        for (slot, item) in out.iter_mut().zip(self.iter()) {
            *slot = item;
            n += 1;
        }
        n
    }

    fn shram_offset(&self) -> Result<u32, Error> {
        self.config.shram_offset.ok_or(Error::NotPersistent)
    }

    /// Write the buffer image to SHRAM.
    pub fn store_to_shram<D: RegisterDriver>(&self, shram: &Shram<D>) -> Result<(), Error> {
        let base = self.shram_offset()?;
        let len = self.len();
        Shram::<D>::check_range(base, 8 + len * 4)?;

        shram.write_word(base, self.total_appends)?;
        shram.write_word(base + 4, len)?;
        for (i, item) in self.iter().enumerate() {
            shram.write_word(base + 8 + i as u32 * 4, item)?;
        }
        debug!("buffer stored: {} samples at {:#x}", len, base);
        Ok(())
    }

    /// Replace the contents with the image stored in SHRAM.
    ///
    /// On error the buffer is left untouched, except for SHRAM faults in the
    /// middle of the payload which leave it partially restored.
    pub fn load_from_shram<D: RegisterDriver>(&mut self, shram: &Shram<D>) -> Result<(), Error> {
        let base = self.shram_offset()?;
        Shram::<D>::check_range(base, 8)?;
        let len = shram.read_word(base + 4)?;
        if len > self.capacity() {
            return Err(Error::CorruptLength { len });
        }
        Shram::<D>::check_range(base, 8 + len * 4)?;

        self.reset();
        for i in 0..len {
            let item = shram.read_word(base + 8 + i * 4)?;
            self.push(item);
        }
        self.total_appends = shram.read_word(base)?;
        debug!("buffer loaded: {} samples from {:#x}", len, base);
        Ok(())
    }

    /// Dump the state and raw slots, marking head and tail.
    pub fn print<D: RegisterDriver>(&self, console: &mut Console<D>) {
        console.print(format_args!("--- Printing CircularBuffer ---\n"));
        console.print(format_args!(
            "is_empty: {}, is_full: {}, len: {}\n",
            self.is_empty() as u8,
            self.is_full() as u8,
            self.len()
        ));
        for (i, item) in self.storage.iter().enumerate() {
            console.print(format_args!(" - {:02} - {:8} ", i, item));
            if i == self.head {
                console.print(format_args!(" <H> "));
            }
            if i == self.tail {
                console.print(format_args!(" <T> "));
            }
            console.print(format_args!("\n"));
        }
        console.print(format_args!("[ "));
        for (i, item) in self.iter().enumerate() {
            console.print(format_args!("{:03}: {:03},    ", self.sample_count(i as u32), item));
        }
        console.print(format_args!("]\n"));
        console.print(format_args!("--- ------------------------ ---\n"));
    }

    /// Print the backing slots in physical order.
    pub fn print_raw<D: RegisterDriver>(&self, console: &mut Console<D>) {
        console.print(format_args!("[ "));
        for item in self.storage.iter() {
            console.print(format_args!(" {:03},  ", item));
        }
        console.print(format_args!("]\n"));
    }

    /// Send the samples to the host as an ADP transaction named `name`, one
    /// hex word per line.
    pub fn send_via_adp<D: RegisterDriver>(&self, console: &mut Console<D>, name: &str) {
        let mut tx = console.transaction(name);
        tx.end_of_params();
        for item in self.iter() {
            tx.print(format_args!("\n0x{:08X}", item));
        }
        tx.end();
    }
}

/// Iterator over the samples of a [`CircularBuffer`], oldest first.
pub struct Iter<'b> {
    storage: &'b [u32],
    tail: usize,
    pos: usize,
    len: usize,
}

impl<'b> Iterator for Iter<'b> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.pos == self.len {
            return None;
        }
        let item = self.storage[(self.tail + self.pos) % self.storage.len()];
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.pos;
        (left, Some(left))
    }
}

impl<'b> ExactSizeIterator for Iter<'b> {}

impl<'b> FusedIterator for Iter<'b> {}
