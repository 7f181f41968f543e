use std::path::Path;

use sets::error::Error;
use sets::step::{MapStep, Mapper, Step};
use sets::store::{ArrayDescriptor, Batch, Container, DType};

/// Adds a constant and records the first value and size of every batch it sees.
#[derive(Default)]
struct Shift {
    add: f64,
    batches: Vec<(f64, usize)>,
}

impl Step for Shift {
    fn name(&self) -> &'static str {
        "Shift"
    }
}

impl Mapper for Shift {
    fn apply(&mut self, batch: Batch, _: &ArrayDescriptor) -> Result<Batch, Error> {
        let a = batch.into_array::<f64>()?;
        self.batches
            .push((a.iter().next().copied().unwrap_or(f64::NAN), a.len()));
        let add = self.add;
        Ok(a.mapv(|x| x + add).into())
    }
}

/// Returns one row less than it was given.
struct Drop1;

impl Step for Drop1 {
    fn name(&self) -> &'static str {
        "Drop1"
    }
}

impl Mapper for Drop1 {
    fn apply(&mut self, batch: Batch, _: &ArrayDescriptor) -> Result<Batch, Error> {
        Ok(Batch::zeros(DType::F64, &[batch.rows().saturating_sub(1)]))
    }
}

/// Adds a constant, failing on the `fail_on`-th batch if set.
struct Flaky {
    fail_on: Option<usize>,
    calls: usize,
}

impl Step for Flaky {
    fn name(&self) -> &'static str {
        "Flaky"
    }
}

impl Mapper for Flaky {
    fn apply(&mut self, batch: Batch, _: &ArrayDescriptor) -> Result<Batch, Error> {
        self.calls += 1;
        if self.fail_on == Some(self.calls) {
            return Err(Error::Transform("boom".to_string()));
        }
        Ok(batch.into_array::<f64>()?.mapv(|x| x + 100.0).into())
    }
}

/// Appends `width` copies of `-` to every word.
struct Pad {
    width: usize,
}

impl Step for Pad {
    fn name(&self) -> &'static str {
        "Pad"
    }
}

impl Mapper for Pad {
    fn apply(&mut self, batch: Batch, _: &ArrayDescriptor) -> Result<Batch, Error> {
        let suffix = "-".repeat(self.width);
        Ok(batch
            .into_array::<String>()?
            .mapv(|w| format!("{}{}", w, suffix))
            .into())
    }
}

fn write_range(container: &Path, name: &str, n: usize) {
    let mut c = Container::open(container).unwrap();
    let values: Vec<f64> = (0..n).map(|x| x as f64).collect();
    c.create_with(name, &Batch::from_vec(&[n], values).unwrap())
        .unwrap();
}

fn array(container: &Path, name: &str) -> String {
    format!("{}/{}", container.display(), name)
}

fn read_f64(container: &Path, name: &str) -> Vec<f64> {
    let mut c = Container::open_existing(container).unwrap();
    c.read_all(name)
        .unwrap()
        .into_array::<f64>()
        .unwrap()
        .iter()
        .copied()
        .collect()
}

#[test_log::test]
fn batches_cover_source_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 13);

    let mut step = MapStep::new(Shift::default());
    step.call(&array(&path, "x"), &array(&path, "y"), false, 5)
        .unwrap();

    assert_eq!(
        step.mapper().batches,
        vec![(0.0, 5), (5.0, 5), (10.0, 3)]
    );
    assert_eq!(read_f64(&path, "y"), read_f64(&path, "x"));
}

#[test]
fn existing_target_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 4);
    let (src, dst) = (array(&path, "x"), array(&path, "y"));

    let mut step = MapStep::new(Shift {
        add: 1.0,
        ..Default::default()
    });
    step.call_default(&src, &dst).unwrap();
    let first = std::fs::read(&path).unwrap();

    step.mapper_mut().add = 10.0;
    step.call_default(&src, &dst).unwrap();

    assert_eq!(step.mapper().batches.len(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), first);
    assert_eq!(read_f64(&path, "y"), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn overwrite_recomputes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 4);
    let (src, dst) = (array(&path, "x"), array(&path, "y"));

    let mut step = MapStep::new(Shift {
        add: 1.0,
        ..Default::default()
    });
    step.call_default(&src, &dst).unwrap();
    step.mapper_mut().add = 10.0;
    step.call(&src, &dst, true, 3).unwrap();

    assert_eq!(step.mapper().batches.len(), 3);
    assert_eq!(read_f64(&path, "y"), vec![10.0, 11.0, 12.0, 13.0]);
}

#[test]
fn source_container_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("a.sets");
    let dst = dir.path().join("b.sets");
    write_range(&src, "x", 6);
    let before = std::fs::read(&src).unwrap();

    let out = MapStep::new(Shift::default())
        .call(&array(&src, "x"), &array(&dst, "x"), false, 4)
        .unwrap();
    assert_eq!(out.path(), dst.as_path());
    drop(out);

    assert_eq!(std::fs::read(&src).unwrap(), before);
    assert_eq!(read_f64(&dst, "x"), read_f64(&src, "x"));
}

#[test]
fn same_container_keeps_other_arrays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 5);
    write_range(&path, "z", 2);

    MapStep::new(Shift {
        add: 0.5,
        ..Default::default()
    })
    .call_default(&array(&path, "x"), &array(&path, "y"))
    .unwrap();

    assert_eq!(read_f64(&path, "x"), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(read_f64(&path, "z"), vec![0.0, 1.0]);
    assert_eq!(read_f64(&path, "y"), vec![0.5, 1.5, 2.5, 3.5, 4.5]);
}

#[test]
fn target_file_and_folders_are_created() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("a.sets");
    let dst = dir.path().join("out").join("nested").join("b.sets");
    write_range(&src, "x", 3);

    MapStep::new(Shift::default())
        .call_default(&array(&src, "x"), &array(&dst, "y"))
        .unwrap();
    assert!(dst.is_file());
    assert_eq!(read_f64(&dst, "y"), vec![0.0, 1.0, 2.0]);
}

#[test]
fn empty_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 0);

    let mut step = MapStep::new(Shift::default());
    let out = step
        .call_default(&array(&path, "x"), &array(&path, "y"))
        .unwrap();

    assert!(step.mapper().batches.is_empty());
    assert_eq!(
        out.descriptor("y").unwrap(),
        &ArrayDescriptor::new(vec![0], DType::F64)
    );
}

#[test]
fn missing_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    let mut step = MapStep::new(Shift::default());

    let missing_file = step.call_default(&array(&path, "x"), &array(&path, "y"));
    assert!(matches!(missing_file, Err(Error::MissingInput(_))));
    assert!(!path.exists());

    write_range(&path, "x", 2);
    let missing_array = step.call_default(&array(&path, "nope"), &array(&path, "y"));
    assert!(matches!(missing_array, Err(Error::MissingInput(_))));
}

#[test]
fn invalid_paths() {
    let mut step = MapStep::new(Shift::default());
    assert!(matches!(
        step.call_default("data.h5/x", "data.sets/y"),
        Err(Error::InvalidPath(_))
    ));
    assert!(matches!(
        step.call_default("data.sets/x", "data.sets"),
        Err(Error::InvalidPath(_))
    ));
}

#[test]
fn row_count_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 4);

    let res = MapStep::new(Drop1).call(&array(&path, "x"), &array(&path, "y"), false, 2);
    assert!(matches!(
        res,
        Err(Error::RowCountMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[test_log::test]
fn failed_run_is_redone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    write_range(&path, "x", 4);
    let (src, dst) = (array(&path, "x"), array(&path, "y"));

    let mut failing = MapStep::new(Flaky {
        fail_on: Some(2),
        calls: 0,
    });
    assert!(matches!(
        failing.call(&src, &dst, false, 2),
        Err(Error::Transform(_))
    ));
    let c = Container::open_existing(&path).unwrap();
    assert!(!c.is_complete("y").unwrap());
    drop(c);

    let mut step = MapStep::new(Flaky {
        fail_on: None,
        calls: 0,
    });
    let out = step.call(&src, &dst, false, 2).unwrap();
    assert!(!step.skipped());
    assert_eq!(step.mapper().calls, 2);
    assert!(out.is_complete("y").unwrap());
    drop(out);
    assert_eq!(read_f64(&path, "y"), vec![100.0, 101.0, 102.0, 103.0]);

    step.call(&src, &dst, false, 2).unwrap();
    assert!(step.skipped());
    assert_eq!(step.mapper().calls, 2);
}

#[test]
fn repeated_text_overwrites_stay_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let words: Vec<String> = (0..200).map(|i| format!("word{}", i)).collect();
    let batch = Batch::from_vec(&[200], words).unwrap();

    let path = dir.path().join("data.sets");
    let mut c = Container::open(&path).unwrap();
    c.create_with("words", &batch).unwrap();
    drop(c);
    let (src, dst) = (array(&path, "words"), array(&path, "padded"));

    let mut step = MapStep::new(Pad { width: 0 });
    for width in 0..40 {
        step.mapper_mut().width = width;
        step.call(&src, &dst, true, 64).unwrap();
    }

    // a single run at the final width, into a fresh container
    let fresh = dir.path().join("fresh.sets");
    let mut c = Container::open(&fresh).unwrap();
    c.create_with("words", &batch).unwrap();
    drop(c);
    MapStep::new(Pad { width: 39 })
        .call_default(&array(&fresh, "words"), &array(&fresh, "padded"))
        .unwrap();

    let size = std::fs::metadata(&path).unwrap().len();
    let fresh_size = std::fs::metadata(&fresh).unwrap().len();
    assert!(size <= 3 * fresh_size, "{} > 3 * {}", size, fresh_size);

    let mut c = Container::open_existing(&path).unwrap();
    let padded = c.read_rows("padded", 5..6).unwrap();
    assert_eq!(
        padded,
        Batch::from_vec(&[1], vec![format!("word5{}", "-".repeat(39))]).unwrap()
    );
}

#[test]
fn identical_text_overwrites_keep_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sets");
    let words: Vec<String> = (0..1000).map(|i| format!("word{}", i)).collect();
    let mut c = Container::open(&path).unwrap();
    c.create_with("words", &Batch::from_vec(&[1000], words).unwrap())
        .unwrap();
    drop(c);
    let (src, dst) = (array(&path, "words"), array(&path, "padded"));

    let mut step = MapStep::new(Pad { width: 3 });
    step.call_default(&src, &dst).unwrap();
    let size = std::fs::metadata(&path).unwrap().len();
    for _ in 0..50 {
        step.call(&src, &dst, true, 100).unwrap();
    }
    // each run only appends two small indexes
    assert!(std::fs::metadata(&path).unwrap().len() < size + 50 * 2 * 200);
}
