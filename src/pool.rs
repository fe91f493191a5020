use std::path::Path;

use log::warn;

use crate::error::{BufferError, BufferResult};
use crate::stats::UsageStats;
use crate::store::{OpenMode, PageStore};
use crate::{DEFAULT_FRAME_COUNT, DEFAULT_PAGE_SIZE, PageNum};

/// Index of a frame and its control block inside the pool.
type FrameId = usize;

/// Opaque ticket for a pinned page, issued by `fix` and `fix_empty`.
///
/// A handle stays valid until the pin it represents is released with
/// `unpin`. Using it afterwards is caller misuse and is reported as an
/// error, never honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    frame: FrameId,
}

/// Control block for one frame.
struct Bcb {
    /// Page held by the frame, `None` while the frame is on the free list.
    page_num: Option<PageNum>,
    /// Outstanding pins. A nonzero count blocks eviction.
    pin_count: u32,
    /// Frame bytes differ from the backing file and need a write-back.
    dirty: bool,
    /// Recency-list links. The head end is scanned first for victims.
    lru_prev: Option<FrameId>,
    lru_next: Option<FrameId>,
    /// Next control block in the same lookup bucket.
    hash_next: Option<FrameId>,
}

impl Bcb {
    fn free() -> Self {
        Self {
            page_num: None,
            pin_count: 0,
            dirty: false,
            lru_prev: None,
            lru_next: None,
            hash_next: None,
        }
    }
}

/// Running lookup counters reported through `usage_stats`.
#[derive(Default, Clone, Copy)]
struct Counters {
    requests: u64,
    hits: u64,
    hit_lookups: u64,
    miss_lookups: u64,
}

/// Single-threaded page cache over one fixed-size-page file.
///
/// A fixed number of in-memory frames front the file. Callers pin pages
/// with `fix`/`fix_empty`, touch the bytes through the returned handle,
/// and release them with `unpin`. Unpinned pages stay cached and are
/// recycled in least-recently-used order when a miss needs a frame;
/// pinned pages are never recycled. Writes are deferred: mutated pages
/// must be marked dirty and reach the file only on eviction, flush, or
/// close.
pub struct BufferPool {
    /// Backing file the frames cache.
    store: PageStore,
    /// Frame bytes, one contiguous allocation of `frame_count` pages.
    frames: Box<[u8]>,
    /// Control block for each frame, addressed by `FrameId`.
    bcbs: Vec<Bcb>,
    /// Bucket heads of the page lookup index, one bucket per frame.
    buckets: Box<[Option<FrameId>]>,
    /// Frames not holding any page.
    free: Vec<FrameId>,
    /// Recency-list ends. Head is least recently touched.
    lru_head: Option<FrameId>,
    lru_tail: Option<FrameId>,
    frame_count: usize,
    page_size: usize,
    counters: Counters,
    /// Set once teardown has run, so `close` and `Drop` do it exactly once.
    closed: bool,
}

impl BufferPool {
    /// Opens a pool with the default frame count and page size.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> BufferResult<Self> {
        Self::open_with(path, mode, DEFAULT_FRAME_COUNT, DEFAULT_PAGE_SIZE)
    }

    /// Opens a pool of `frame_count` frames of `page_size` bytes each.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        frame_count: usize,
        page_size: usize,
    ) -> BufferResult<Self> {
        if frame_count == 0 {
            return Err(BufferError::InvalidFrameCount(frame_count));
        }
        let store = PageStore::open(path, mode, page_size)?;

        Ok(Self {
            store,
            frames: vec![0u8; frame_count * page_size].into_boxed_slice(),
            bcbs: (0..frame_count).map(|_| Bcb::free()).collect(),
            buckets: vec![None; frame_count].into_boxed_slice(),
            free: (0..frame_count).collect(),
            lru_head: None,
            lru_tail: None,
            frame_count,
            page_size,
            counters: Counters::default(),
            closed: false,
        })
    }

    /// Pins `page` into a frame, reading it from the backing file on a miss.
    ///
    /// The returned handle stays valid until the matching `unpin`. Fails
    /// with `PoolSaturated` when every frame is pinned, and with `ReadPage`
    /// when the backing file does not fully hold the page.
    pub fn fix(&mut self, page: PageNum) -> BufferResult<PageHandle> {
        self.fix_frame(page, true)
    }

    /// Pins `page` without reading the backing file.
    ///
    /// For pages about to be written for the first time. On a miss the
    /// frame contents are unspecified until the caller fills them; a page
    /// that is already resident is pinned as a plain hit.
    pub fn fix_empty(&mut self, page: PageNum) -> BufferResult<PageHandle> {
        self.fix_frame(page, false)
    }

    fn fix_frame(&mut self, page: PageNum, load: bool) -> BufferResult<PageHandle> {
        self.counters.requests += 1;

        let (found, links) = self.scan_bucket(page);
        if let Some(frame) = found {
            self.counters.hits += 1;
            self.counters.hit_lookups += links;
            self.bcbs[frame].pin_count += 1;
            // A repeat fix refreshes recency even if the page never unpinned.
            self.lru_detach(frame);
            self.lru_push_tail(frame);
            return Ok(PageHandle { frame });
        }
        self.counters.miss_lookups += links;

        let frame = match self.free.pop() {
            Some(frame) => frame,
            None => self.evict_victim(page)?,
        };

        let bcb = &mut self.bcbs[frame];
        bcb.page_num = Some(page);
        bcb.pin_count = 1;
        bcb.dirty = false;

        if load {
            let range = self.frame_range(frame);
            if let Err(err) = self.store.read_page(page, &mut self.frames[range]) {
                // An unreadable page must not occupy a frame.
                self.bcbs[frame] = Bcb::free();
                self.free.push(frame);
                return Err(err);
            }
        }

        self.hash_insert(frame, page);
        self.lru_push_tail(frame);

        Ok(PageHandle { frame })
    }

    /// Adds a pin on an already fixed page and returns the new pin count.
    pub fn pin(&mut self, handle: PageHandle) -> BufferResult<u32> {
        let frame = self.resolve(handle)?;
        let bcb = &mut self.bcbs[frame];
        bcb.pin_count += 1;
        Ok(bcb.pin_count)
    }

    /// Releases one pin and returns the remaining count.
    ///
    /// The page stays cached at its current recency position; only a later
    /// fix moves it. Releasing more pins than were taken is misuse.
    pub fn unpin(&mut self, handle: PageHandle) -> BufferResult<u32> {
        let frame = self.resolve(handle)?;
        let bcb = &mut self.bcbs[frame];
        bcb.pin_count -= 1;
        Ok(bcb.pin_count)
    }

    /// Records that the caller mutated the frame in place.
    ///
    /// Without the mark, eviction and close are free to drop the bytes.
    pub fn mark_dirty(&mut self, handle: PageHandle) -> BufferResult<()> {
        let frame = self.resolve(handle)?;
        self.bcbs[frame].dirty = true;
        Ok(())
    }

    /// Whether the handle's page has unwritten modifications.
    pub fn is_dirty(&self, handle: PageHandle) -> BufferResult<bool> {
        let frame = self.resolve(handle)?;
        Ok(self.bcbs[frame].dirty)
    }

    /// Page number held by the handle's frame.
    pub fn page_num(&self, handle: PageHandle) -> BufferResult<PageNum> {
        let frame = self.resolve(handle)?;
        // A pinned frame always holds a page.
        Ok(self.bcbs[frame].page_num.expect("pinned frame without a page"))
    }

    /// Read access to the handle's frame bytes.
    pub fn page(&self, handle: PageHandle) -> BufferResult<&[u8]> {
        let frame = self.resolve(handle)?;
        let range = self.frame_range(frame);
        Ok(&self.frames[range])
    }

    /// Write access to the handle's frame bytes.
    ///
    /// Mutating the slice does not mark the page dirty; call `mark_dirty`
    /// or the change may be lost.
    pub fn page_mut(&mut self, handle: PageHandle) -> BufferResult<&mut [u8]> {
        let frame = self.resolve(handle)?;
        let range = self.frame_range(frame);
        Ok(&mut self.frames[range])
    }

    /// Writes every dirty resident page back to the backing file and syncs.
    ///
    /// Pages stay resident and pinned pages stay pinned; only the dirty
    /// flags are cleared. Stops at the first write failure.
    pub fn flush_all(&mut self) -> BufferResult<()> {
        let mut cur = self.lru_head;
        while let Some(frame) = cur {
            let bcb = &self.bcbs[frame];
            cur = bcb.lru_next;
            if bcb.dirty
                && let Some(page) = bcb.page_num
            {
                self.write_back(frame, page)?;
                self.bcbs[frame].dirty = false;
            }
        }
        self.store.sync()
    }

    /// Flushes (read-write), deletes the backing file (transient), and
    /// consumes the pool.
    ///
    /// Teardown always runs to completion; the first failure is reported
    /// after the rest of the pages have been given their chance to reach
    /// the file. Pages still pinned at close are logged and flushed anyway.
    pub fn close(mut self) -> BufferResult<()> {
        self.shutdown()
    }

    /// Snapshot of the running counters and the lookup-index shape.
    pub fn usage_stats(&self) -> UsageStats {
        let mut used_buckets = 0;
        let mut max_chain_len = 0;
        let mut min_chain_len = 0;
        let mut resident_pages = 0;

        for head in self.buckets.iter() {
            let mut len = 0;
            let mut cur = *head;
            while let Some(frame) = cur {
                len += 1;
                cur = self.bcbs[frame].hash_next;
            }
            if len == 0 {
                continue;
            }
            used_buckets += 1;
            resident_pages += len;
            max_chain_len = max_chain_len.max(len);
            min_chain_len = if used_buckets == 1 {
                len
            } else {
                min_chain_len.min(len)
            };
        }

        UsageStats {
            requests: self.counters.requests,
            hits: self.counters.hits,
            hit_lookups: self.counters.hit_lookups,
            miss_lookups: self.counters.miss_lookups,
            bucket_count: self.buckets.len(),
            used_buckets,
            max_chain_len,
            min_chain_len,
            resident_pages,
        }
    }

    /// Whether `page` is resident, without counting as a lookup.
    pub fn is_resident(&self, page: PageNum) -> bool {
        self.scan_bucket(page).0.is_some()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn mode(&self) -> OpenMode {
        self.store.mode()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Number of frames currently holding a page.
    pub fn resident_count(&self) -> usize {
        self.frame_count - self.free.len()
    }

    /// Number of frames on the free list.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of resident pages with unwritten modifications.
    pub fn dirty_count(&self) -> usize {
        self.bcbs.iter().filter(|bcb| bcb.dirty).count()
    }

    /// Read access to the backing store.
    pub fn store(&self) -> &PageStore {
        &self.store
    }

    /// Mutable access to the backing store, bypassing the cache.
    ///
    /// Pages written here are not reflected in already resident frames.
    pub fn store_mut(&mut self) -> &mut PageStore {
        &mut self.store
    }

    /// Resolves a handle to its frame, enforcing the pinned-holder contract.
    fn resolve(&self, handle: PageHandle) -> BufferResult<FrameId> {
        let frame = handle.frame;
        if frame >= self.bcbs.len() {
            return Err(BufferError::InvalidHandle(frame));
        }
        if self.bcbs[frame].pin_count == 0 {
            return Err(BufferError::NotPinned(frame));
        }
        Ok(frame)
    }

    /// Walks the bucket chain for `page`, returning the resident frame if
    /// any and the number of links examined.
    fn scan_bucket(&self, page: PageNum) -> (Option<FrameId>, u64) {
        let mut links = 0;
        let mut cur = self.buckets[self.bucket_of(page)];
        while let Some(frame) = cur {
            links += 1;
            if self.bcbs[frame].page_num == Some(page) {
                return (Some(frame), links);
            }
            cur = self.bcbs[frame].hash_next;
        }
        (None, links)
    }

    fn bucket_of(&self, page: PageNum) -> usize {
        (page % self.frame_count as u64) as usize
    }

    fn hash_insert(&mut self, frame: FrameId, page: PageNum) {
        let bucket = self.bucket_of(page);
        self.bcbs[frame].hash_next = self.buckets[bucket];
        self.buckets[bucket] = Some(frame);
    }

    fn hash_remove(&mut self, frame: FrameId, page: PageNum) {
        let bucket = self.bucket_of(page);
        let mut prev: Option<FrameId> = None;
        let mut cur = self.buckets[bucket];
        while let Some(f) = cur {
            if f == frame {
                let next = self.bcbs[f].hash_next;
                match prev {
                    Some(p) => self.bcbs[p].hash_next = next,
                    None => self.buckets[bucket] = next,
                }
                self.bcbs[f].hash_next = None;
                return;
            }
            prev = cur;
            cur = self.bcbs[f].hash_next;
        }
    }

    /// Unlinks a frame from the recency list.
    fn lru_detach(&mut self, frame: FrameId) {
        let prev = self.bcbs[frame].lru_prev;
        let next = self.bcbs[frame].lru_next;
        match prev {
            Some(p) => self.bcbs[p].lru_next = next,
            None => self.lru_head = next,
        }
        match next {
            Some(n) => self.bcbs[n].lru_prev = prev,
            None => self.lru_tail = prev,
        }
        self.bcbs[frame].lru_prev = None;
        self.bcbs[frame].lru_next = None;
    }

    /// Appends a frame at the most recently touched end.
    fn lru_push_tail(&mut self, frame: FrameId) {
        self.bcbs[frame].lru_prev = self.lru_tail;
        self.bcbs[frame].lru_next = None;
        match self.lru_tail {
            Some(t) => self.bcbs[t].lru_next = Some(frame),
            None => self.lru_head = Some(frame),
        }
        self.lru_tail = Some(frame);
    }

    /// First unpinned frame from the least recently touched end.
    fn find_victim(&self) -> Option<(FrameId, PageNum)> {
        let mut cur = self.lru_head;
        while let Some(frame) = cur {
            let bcb = &self.bcbs[frame];
            if bcb.pin_count == 0 {
                // Recency-list members always hold a page.
                return Some((frame, bcb.page_num.expect("free frame on recency list")));
            }
            cur = bcb.lru_next;
        }
        None
    }

    /// Selects a victim, writes it back if dirty, and detaches it.
    ///
    /// On write failure the victim keeps its place, still resident and
    /// still dirty, and the miss that needed the frame fails.
    fn evict_victim(&mut self, want: PageNum) -> BufferResult<FrameId> {
        let Some((victim, victim_page)) = self.find_victim() else {
            return Err(BufferError::PoolSaturated(want));
        };
        if self.bcbs[victim].dirty {
            self.write_back(victim, victim_page)?;
        }
        self.hash_remove(victim, victim_page);
        self.lru_detach(victim);
        Ok(victim)
    }

    /// Writes a frame's bytes to the backing file at the page's offset.
    fn write_back(&mut self, frame: FrameId, page: PageNum) -> BufferResult<()> {
        let range = self.frame_range(frame);
        self.store.write_page(page, &self.frames[range])
    }

    fn frame_range(&self, frame: FrameId) -> std::ops::Range<usize> {
        let start = frame * self.page_size;
        start..start + self.page_size
    }

    /// One-shot teardown shared by `close` and `Drop`.
    fn shutdown(&mut self) -> BufferResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.store.mode() {
            OpenMode::ReadOnly => Ok(()),
            OpenMode::Transient => self.store.remove_backing(),
            OpenMode::ReadWrite => {
                let mut first_err = None;

                let mut cur = self.lru_head;
                while let Some(frame) = cur {
                    let bcb = &self.bcbs[frame];
                    cur = bcb.lru_next;
                    if bcb.pin_count > 0
                        && let Some(page) = bcb.page_num
                    {
                        warn!(
                            "{}: page {page} still pinned at close (pin count {})",
                            self.store.path().display(),
                            bcb.pin_count
                        );
                    }
                    if bcb.dirty
                        && let Some(page) = bcb.page_num
                    {
                        match self.write_back(frame, page) {
                            Ok(()) => self.bcbs[frame].dirty = false,
                            Err(err) => {
                                if first_err.is_none() {
                                    first_err = Some(err);
                                }
                            }
                        }
                    }
                }

                if let Err(err) = self.store.sync()
                    && first_err.is_none()
                {
                    first_err = Some(err);
                }

                match first_err {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // Flush dirty pages when the pool is dropped without a close call.
        if let Err(err) = self.shutdown() {
            warn!("{}: close failed: {err}", self.store.path().display());
        }
    }
}
