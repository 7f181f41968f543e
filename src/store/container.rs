/*!
# Array container file

A container is a single file holding any number of named, typed, shaped arrays.

Layout:

- a 32 bytes header: magic, version, reserved word, then offset and length of the index,
- data regions of arrays, row-major, little-endian,
- heap of text elements,
- the index: a JSON object mapping array names to their descriptor, data offset and completion flag.

Allocation is append-only. Creating an array appends its (zeroed) data region and a fresh index,
then points the header to the new index. Existing arrays are never moved.
Text elements are stored as `(u64 offset, u32 length)` slots pointing into the heap.
Rewriting a text element reuses its heap bytes when the new text fits, and appends otherwise.
Bytes left unreferenced (superseded indexes, outgrown text) are reclaimed by [Container::compact].

An array created with [Container::create_pending] stays incomplete until [Container::set_complete] is called,
so that a writer interrupted halfway leaves a mark readers can check.
!*/
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, info};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{Batch, DType, FixedElement, STR_SLOT_SIZE};
use crate::error::Error;

/// Magic bytes identifying a container file.
pub const MAGIC: &[u8; 8] = b"SETSARR\0";

/// Current format version.
pub const VERSION: u32 = 1;

/// Header size in bytes (magic + version + reserved + index offset + index length).
pub const HEADER_SIZE: u64 = 32;

/// Rows copied at once by [Container::compact].
const COPY_ROWS: usize = 1024;

/// Shape and element type of a stored array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl ArrayDescriptor {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Trailing dimensions, shared by every row.
    pub fn row_shape(&self) -> &[usize] {
        self.shape.get(1..).unwrap_or(&[])
    }

    /// Number of elements in a single row.
    pub fn row_elements(&self) -> usize {
        self.row_shape().iter().product()
    }

    /// Bytes taken by a single row in the data region.
    pub fn row_bytes(&self) -> u64 {
        (self.row_elements() * self.dtype.element_size()) as u64
    }

    /// Bytes taken by the whole data region.
    pub fn nbytes(&self) -> u64 {
        self.row_bytes() * self.len() as u64
    }

    /// [ArrayDescriptor::nbytes], or `None` if the shape is too large to be stored.
    pub fn checked_nbytes(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(self.dtype.element_size() as u64, |acc, dim| {
                acc.checked_mul(u64::try_from(*dim).ok()?)
            })
            .filter(|n| usize::try_from(*n).is_ok())
    }
}

impl fmt::Display for ArrayDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.shape.iter().join(", "), self.dtype)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    #[serde(flatten)]
    descriptor: ArrayDescriptor,
    offset: u64,
    #[serde(default = "complete_by_default")]
    complete: bool,
}

fn complete_by_default() -> bool {
    true
}

/// An open container file.
///
/// The file handle is released when the value is dropped.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    file: File,
    index: BTreeMap<String, Entry>,
    index_len: u64,
    end: u64,
}

impl Container {
    /// Open the container at `path`, creating it (and missing parent folders) if needed.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Self::from_file(path, file)
    }

    /// Open an existing container, failing with [Error::MissingInput] if there is no file at `path`.
    pub fn open_existing(path: &Path) -> Result<Self, Error> {
        if !path.is_file() {
            return Err(Error::MissingInput(format!(
                "container {:?} does not exist",
                path
            )));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: File) -> Result<Self, Error> {
        let end = file.metadata()?.len();
        let mut container = Container {
            path: path.to_path_buf(),
            file,
            index: BTreeMap::new(),
            index_len: 0,
            end,
        };

        if end == 0 {
            debug!("initializing empty container {:?}", path);
            container.end = HEADER_SIZE;
            container.write_index()?;
        } else {
            container.read_index()?;
        }
        Ok(container)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.end
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Array names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn descriptor(&self, name: &str) -> Result<&ArrayDescriptor, Error> {
        self.entry(name).map(|e| &e.descriptor)
    }

    /// Whether every row of `name` has been written.
    pub fn is_complete(&self, name: &str) -> Result<bool, Error> {
        self.entry(name).map(|e| e.complete)
    }

    fn entry(&self, name: &str) -> Result<&Entry, Error> {
        self.index.get(name).ok_or_else(|| {
            Error::MissingInput(format!("container {:?} has no array {:?}", self.path, name))
        })
    }

    /// Create a zero-filled array.
    ///
    /// Other arrays of the container are left untouched.
    pub fn create(&mut self, name: &str, descriptor: ArrayDescriptor) -> Result<(), Error> {
        self.allocate(name, descriptor, true)?;
        self.write_index()
    }

    /// Create a zero-filled array marked incomplete, see [Container::set_complete].
    pub fn create_pending(&mut self, name: &str, descriptor: ArrayDescriptor) -> Result<(), Error> {
        self.allocate(name, descriptor, false)?;
        self.write_index()
    }

    /// Create an array shaped after `batch` and fill it.
    pub fn create_with(&mut self, name: &str, batch: &Batch) -> Result<(), Error> {
        let descriptor = ArrayDescriptor::new(batch.shape().to_vec(), batch.dtype());
        self.create(name, descriptor)?;
        self.write_rows(name, 0, batch)
    }

    /// Mark `name` as fully written, or not.
    pub fn set_complete(&mut self, name: &str, complete: bool) -> Result<(), Error> {
        let path = &self.path;
        let entry = self.index.get_mut(name).ok_or_else(|| {
            Error::MissingInput(format!("container {:?} has no array {:?}", path, name))
        })?;
        if entry.complete != complete {
            entry.complete = complete;
            self.write_index()?;
        }
        Ok(())
    }

    /// Drop array `name` from the index. Its bytes are reclaimed by the next [Container::compact].
    pub fn remove(&mut self, name: &str) -> Result<(), Error> {
        if self.index.remove(name).is_none() {
            return Err(Error::MissingInput(format!(
                "container {:?} has no array {:?}",
                self.path, name
            )));
        }
        info!("removing array {:?} from {:?}", name, self.path);
        self.write_index()
    }

    /// Reserve the data region of a new array, without writing the index.
    fn allocate(&mut self, name: &str, descriptor: ArrayDescriptor, complete: bool) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("array name is empty".to_string()));
        }
        if descriptor.shape.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "array {:?} needs at least one dimension",
                name
            )));
        }
        if self.contains(name) {
            return Err(Error::InvalidArgument(format!(
                "array {:?} already exists in {:?}",
                name, self.path
            )));
        }
        let end = descriptor
            .checked_nbytes()
            .and_then(|n| self.end.checked_add(n))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("array {:?} {} is too large", name, descriptor))
            })?;

        let offset = self.end;
        self.end = end;
        self.file.set_len(self.end)?;
        info!(
            "creating array {:?} {} in {:?}",
            name, descriptor, self.path
        );
        self.index.insert(
            name.to_string(),
            Entry {
                descriptor,
                offset,
                complete,
            },
        );
        Ok(())
    }

    /// Read rows `rows` of array `name`.
    pub fn read_rows(&mut self, name: &str, rows: Range<usize>) -> Result<Batch, Error> {
        let entry = self.entry(name)?.clone();
        let descriptor = &entry.descriptor;
        check_bounds(&rows, descriptor.len())?;

        let nb_rows = rows.end - rows.start;
        let mut shape = Vec::with_capacity(descriptor.shape.len());
        shape.push(nb_rows);
        shape.extend_from_slice(descriptor.row_shape());

        let mut bytes = vec![0u8; (descriptor.row_bytes() * nb_rows as u64) as usize];
        self.read_at(
            entry.offset + descriptor.row_bytes() * rows.start as u64,
            &mut bytes,
        )?;

        match descriptor.dtype {
            DType::U8 => Batch::from_vec(&shape, decode_fixed::<u8>(&bytes)),
            DType::I32 => Batch::from_vec(&shape, decode_fixed::<i32>(&bytes)),
            DType::I64 => Batch::from_vec(&shape, decode_fixed::<i64>(&bytes)),
            DType::F32 => Batch::from_vec(&shape, decode_fixed::<f32>(&bytes)),
            DType::F64 => Batch::from_vec(&shape, decode_fixed::<f64>(&bytes)),
            DType::Str => {
                let strings = self.decode_text(&bytes)?;
                Batch::from_vec(&shape, strings)
            }
        }
    }

    /// Read a whole array.
    pub fn read_all(&mut self, name: &str) -> Result<Batch, Error> {
        let len = self.descriptor(name)?.len();
        self.read_rows(name, 0..len)
    }

    /// Write `batch` into array `name`, starting at row `offset`.
    ///
    /// The batch must have the array's dtype and trailing dimensions, and fit in its rows.
    pub fn write_rows(&mut self, name: &str, offset: usize, batch: &Batch) -> Result<(), Error> {
        let entry = self.entry(name)?.clone();
        let descriptor = &entry.descriptor;

        if batch.dtype() != descriptor.dtype {
            return Err(Error::DTypeMismatch {
                expected: descriptor.dtype,
                actual: batch.dtype(),
            });
        }
        if batch.shape().get(1..).unwrap_or(&[]) != descriptor.row_shape() || batch.shape().is_empty()
        {
            let mut expected = vec![batch.rows()];
            expected.extend_from_slice(descriptor.row_shape());
            return Err(Error::ShapeMismatch {
                expected,
                actual: batch.shape().to_vec(),
            });
        }
        let rows = offset..offset + batch.rows();
        check_bounds(&rows, descriptor.len())?;
        let pos = entry.offset + descriptor.row_bytes() * offset as u64;

        let bytes = match batch {
            Batch::U8(a) => encode_fixed(a),
            Batch::I32(a) => encode_fixed(a),
            Batch::I64(a) => encode_fixed(a),
            Batch::F32(a) => encode_fixed(a),
            Batch::F64(a) => encode_fixed(a),
            Batch::Str(a) => {
                let mut previous = vec![0u8; a.len() * STR_SLOT_SIZE];
                self.read_at(pos, &mut previous)?;
                self.encode_text(a, &previous)?
            }
        };
        self.write_at(pos, &bytes)
    }

    /// Flush pending writes to disk.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.file.flush()?;
        Ok(())
    }

    /// Bytes of the file no array refers to: superseded indexes, removed arrays and outgrown text.
    pub fn unreferenced_bytes(&mut self) -> Result<u64, Error> {
        let mut live = HEADER_SIZE + self.index_len;
        let entries: Vec<Entry> = self.index.values().cloned().collect();
        for entry in entries {
            live += entry.descriptor.nbytes();
            if !entry.descriptor.dtype.is_text() {
                continue;
            }
            let row_bytes = entry.descriptor.row_bytes();
            let len = entry.descriptor.len();
            let mut row = 0;
            while row < len {
                let end = (row + COPY_ROWS).min(len);
                let mut slots = vec![0u8; (row_bytes * (end - row) as u64) as usize];
                self.read_at(entry.offset + row_bytes * row as u64, &mut slots)?;
                live += slots
                    .chunks_exact(STR_SLOT_SIZE)
                    .map(|slot| u64::from(read_u32(&slot[8..12])))
                    .sum::<u64>();
                row = end;
            }
        }
        Ok(self.end.saturating_sub(live))
    }

    /// Rewrite the container without its unreferenced bytes.
    ///
    /// Arrays are copied into a temporary file next to this one, which then replaces it.
    pub fn compact(mut self) -> Result<Container, Error> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let before = self.end;
        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut out = Container::from_file(&self.path, tmp.as_file().try_clone()?)?;
            let entries: Vec<(String, Entry)> = self
                .index
                .iter()
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect();
            for (name, entry) in entries {
                out.allocate(&name, entry.descriptor.clone(), entry.complete)?;
                let len = entry.descriptor.len();
                let mut row = 0;
                while row < len {
                    let end = (row + COPY_ROWS).min(len);
                    let batch = self.read_rows(&name, row..end)?;
                    out.write_rows(&name, row, &batch)?;
                    row = end;
                }
            }
            out.write_index()?;
            out.flush()?;
        }

        let path = self.path.clone();
        drop(self);
        tmp.persist(&path)?;
        let compacted = Container::open_existing(&path)?;
        info!(
            "compacted {:?} from {} to {} bytes",
            path, before, compacted.end
        );
        Ok(compacted)
    }

    /// [Container::compact] if at least half of the file is unreferenced.
    pub fn compact_if_sparse(mut self) -> Result<Container, Error> {
        let unreferenced = self.unreferenced_bytes()?;
        if unreferenced.saturating_mul(2) > self.end {
            self.compact()
        } else {
            debug!(
                "{:?}: {} of {} bytes unreferenced",
                self.path, unreferenced, self.end
            );
            Ok(self)
        }
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::Corrupt(format!(
                "{:?} ends before byte {}",
                self.path,
                pos.saturating_add(buf.len() as u64)
            )),
            _ => Error::Io(e),
        })
    }

    fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<(), Error> {
        if buf.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(buf)?;
        self.end = self.end.max(pos + buf.len() as u64);
        Ok(())
    }

    /// Append bytes at the end of file, returning their offset.
    fn append(&mut self, buf: &[u8]) -> Result<u64, Error> {
        let pos = self.end;
        self.write_at(pos, buf)?;
        Ok(pos)
    }

    fn decode_text(&mut self, slots: &[u8]) -> Result<Vec<String>, Error> {
        let mut strings = Vec::with_capacity(slots.len() / STR_SLOT_SIZE);
        for slot in slots.chunks_exact(STR_SLOT_SIZE) {
            let pos = read_u64(&slot[..8]);
            let len = read_u32(&slot[8..12]) as usize;
            if len == 0 {
                strings.push(String::new());
                continue;
            }
            if !self.in_file(pos, len as u64) {
                return Err(Error::Corrupt(format!(
                    "text element at {} overflows {:?}",
                    pos, self.path
                )));
            }
            let mut buf = vec![0u8; len];
            self.read_at(pos, &mut buf)?;
            let s = String::from_utf8(buf).map_err(|e| {
                Error::Corrupt(format!("invalid utf-8 text in {:?}: {}", self.path, e))
            })?;
            strings.push(s);
        }
        Ok(strings)
    }

    /// Slots for `array`, given the slots it replaces.
    ///
    /// Text that fits in the heap bytes of the element it replaces is written over them.
    fn encode_text(&mut self, array: &ArrayD<String>, previous: &[u8]) -> Result<Vec<u8>, Error> {
        let mut slots = Vec::with_capacity(array.len() * STR_SLOT_SIZE);
        for (s, old) in array.iter().zip(previous.chunks_exact(STR_SLOT_SIZE)) {
            let len = u32::try_from(s.len()).map_err(|_| {
                Error::InvalidArgument(format!("text element of {} bytes is too long", s.len()))
            })?;
            let (old_pos, old_len) = (read_u64(&old[..8]), read_u32(&old[8..12]));

            let pos = if len == 0 {
                0
            } else if len <= old_len && self.in_file(old_pos, u64::from(old_len)) {
                self.write_at(old_pos, s.as_bytes())?;
                old_pos
            } else {
                self.append(s.as_bytes())?
            };
            slots.extend_from_slice(&pos.to_le_bytes());
            slots.extend_from_slice(&len.to_le_bytes());
        }
        Ok(slots)
    }

    /// Whether `len` bytes at `pos` lie past the header and inside the file.
    fn in_file(&self, pos: u64, len: u64) -> bool {
        pos >= HEADER_SIZE && pos.checked_add(len).map_or(false, |end| end <= self.end)
    }

    fn read_index(&mut self) -> Result<(), Error> {
        let mut header = [0u8; HEADER_SIZE as usize];
        if self.end < HEADER_SIZE {
            return Err(Error::Corrupt(format!("{:?} is too short", self.path)));
        }
        self.read_at(0, &mut header)?;
        if &header[..8] != MAGIC {
            return Err(Error::Corrupt(format!(
                "{:?} is not a container file (bad magic)",
                self.path
            )));
        }
        let version = read_u32(&header[8..12]);
        if version != VERSION {
            return Err(Error::Corrupt(format!(
                "{:?} has unsupported version {}",
                self.path, version
            )));
        }
        let index_offset = read_u64(&header[16..24]);
        let index_len = read_u64(&header[24..32]);
        if !self.in_file(index_offset, index_len) {
            return Err(Error::Corrupt(format!(
                "index of {:?} points past end of file",
                self.path
            )));
        }

        let mut buf = vec![0u8; index_len as usize];
        self.read_at(index_offset, &mut buf)?;
        let index: BTreeMap<String, Entry> = serde_json::from_slice(&buf).map_err(|e| {
            Error::Corrupt(format!("unreadable index in {:?}: {}", self.path, e))
        })?;
        for (name, entry) in &index {
            let fits = entry
                .descriptor
                .checked_nbytes()
                .map_or(false, |n| self.in_file(entry.offset, n));
            if entry.descriptor.shape.is_empty() || !fits {
                return Err(Error::Corrupt(format!(
                    "array {:?} {} at {} does not fit in {:?}",
                    name, entry.descriptor, entry.offset, self.path
                )));
            }
        }
        self.index = index;
        self.index_len = index_len;
        debug!(
            "opened {:?} with arrays {:?}",
            self.path,
            self.index.keys().collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Append the index and point the header to it.
    fn write_index(&mut self) -> Result<(), Error> {
        let index = serde_json::to_vec(&self.index)?;
        let index_offset = self.append(&index)?;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&index_offset.to_le_bytes());
        header.extend_from_slice(&(index.len() as u64).to_le_bytes());
        self.write_at(0, &header)?;
        self.file.flush()?;
        self.index_len = index.len() as u64;
        Ok(())
    }
}

fn check_bounds(rows: &Range<usize>, len: usize) -> Result<(), Error> {
    if rows.start > rows.end || rows.end > len {
        return Err(Error::OutOfBounds {
            rows: rows.clone(),
            len,
        });
    }
    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn encode_fixed<T: FixedElement>(array: &ArrayD<T>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(array.len() * T::SIZE);
    for v in array.iter() {
        v.write_le(&mut bytes);
    }
    bytes
}

fn decode_fixed<T: FixedElement>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::read_le).collect()
}
