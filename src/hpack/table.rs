//! HPACK indexing tables (RFC 7541 Section 2, Appendix A)
//!
//! Index space: 1..=61 addresses the static table, 62.. addresses the
//! dynamic table newest-first. Index 0 is invalid.

use std::collections::VecDeque;

/// A header field: an ordered (name, value) pair of octet strings.
///
/// Names used on the wire are lowercase; pseudo-header names begin with `:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    /// Create a new header field
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Entry size for dynamic table bookkeeping (RFC 7541 Section 4.1):
    /// name length + value length + 32.
    #[inline]
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

/// The static table (RFC 7541 Appendix A)
pub struct StaticTable;

impl StaticTable {
    /// Number of static table entries
    pub const SIZE: usize = 61;

    /// Static entries, 1-indexed on the wire
    const ENTRIES: [(&'static [u8], &'static [u8]); 61] = [
        (b":authority", b""),
        (b":method", b"GET"),
        (b":method", b"POST"),
        (b":path", b"/"),
        (b":path", b"/index.html"),
        (b":scheme", b"http"),
        (b":scheme", b"https"),
        (b":status", b"200"),
        (b":status", b"204"),
        (b":status", b"206"),
        (b":status", b"304"),
        (b":status", b"400"),
        (b":status", b"404"),
        (b":status", b"500"),
        (b"accept-charset", b""),
        (b"accept-encoding", b"gzip, deflate"),
        (b"accept-language", b""),
        (b"accept-ranges", b""),
        (b"accept", b""),
        (b"access-control-allow-origin", b""),
        (b"age", b""),
        (b"allow", b""),
        (b"authorization", b""),
        (b"cache-control", b""),
        (b"content-disposition", b""),
        (b"content-encoding", b""),
        (b"content-language", b""),
        (b"content-length", b""),
        (b"content-location", b""),
        (b"content-range", b""),
        (b"content-type", b""),
        (b"cookie", b""),
        (b"date", b""),
        (b"etag", b""),
        (b"expect", b""),
        (b"expires", b""),
        (b"from", b""),
        (b"host", b""),
        (b"if-match", b""),
        (b"if-modified-since", b""),
        (b"if-none-match", b""),
        (b"if-range", b""),
        (b"if-unmodified-since", b""),
        (b"last-modified", b""),
        (b"link", b""),
        (b"location", b""),
        (b"max-forwards", b""),
        (b"proxy-authenticate", b""),
        (b"proxy-authorization", b""),
        (b"range", b""),
        (b"referer", b""),
        (b"refresh", b""),
        (b"retry-after", b""),
        (b"server", b""),
        (b"set-cookie", b""),
        (b"strict-transport-security", b""),
        (b"transfer-encoding", b""),
        (b"user-agent", b""),
        (b"vary", b""),
        (b"via", b""),
        (b"www-authenticate", b""),
    ];

    /// Get an entry by wire index (1-indexed)
    #[inline]
    pub fn get(index: usize) -> Option<(&'static [u8], &'static [u8])> {
        if index == 0 || index > Self::SIZE {
            return None;
        }
        Some(Self::ENTRIES[index - 1])
    }

    /// Find the index whose name and value both match
    pub fn find_exact(name: &[u8], value: &[u8]) -> Option<usize> {
        Self::ENTRIES
            .iter()
            .position(|&(n, v)| n == name && v == value)
            .map(|i| i + 1)
    }

    /// Find the first index whose name matches
    pub fn find_name(name: &[u8]) -> Option<usize> {
        Self::ENTRIES
            .iter()
            .position(|&(n, _)| n == name)
            .map(|i| i + 1)
    }
}

/// The dynamic table (RFC 7541 Section 2.3.2)
///
/// An ordered deque with insertion at the front (newest first) and eviction
/// from the back (oldest first). The bookkept size is the sum of entry sizes
/// and never exceeds `max_size`.
#[derive(Debug)]
pub struct DynamicTable {
    entries: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    /// Create a new dynamic table
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    /// Current number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current bookkept size in octets
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Maximum size in octets
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Update the maximum size and evict entries that no longer fit
    /// (RFC 7541 Section 4.3).
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict();
    }

    /// Insert an entry at the front (RFC 7541 Section 4.4).
    ///
    /// An entry larger than the table's maximum clears the table and is
    /// itself dropped.
    pub fn insert(&mut self, field: HeaderField) {
        let entry_size = field.size();

        if entry_size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }

        while self.size + entry_size > self.max_size {
            if let Some(old) = self.entries.pop_back() {
                self.size -= old.size();
            }
        }

        self.entries.push_front(field);
        self.size += entry_size;
    }

    /// Get an entry by dynamic-table index (1 = newest)
    #[inline]
    pub fn get(&self, index: usize) -> Option<&HeaderField> {
        if index == 0 {
            return None;
        }
        self.entries.get(index - 1)
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            if let Some(old) = self.entries.pop_back() {
                self.size -= old.size();
            } else {
                break;
            }
        }
    }
}

/// Resolve a wire index against the combined static + dynamic address space.
pub fn get_indexed<'a>(dynamic: &'a DynamicTable, index: usize) -> Option<(&'a [u8], &'a [u8])> {
    if index <= StaticTable::SIZE {
        StaticTable::get(index)
    } else {
        dynamic
            .get(index - StaticTable::SIZE)
            .map(|f| (f.name.as_slice(), f.value.as_slice()))
    }
}
