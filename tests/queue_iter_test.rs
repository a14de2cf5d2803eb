mod test_utils;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use small_stream::{
    iter::{QueueTupleIter, RowSink},
    CancelToken, ErrorKind, StreamError, Tuple, TupleIter,
};
use test_utils::{new_int_tuples, read_all, setup, test_config};

fn put_all(sink: &RowSink<Tuple>, rows: &[Tuple]) -> Result<(), StreamError> {
    for row in rows {
        sink.put(row.clone())?;
    }
    Ok(())
}

fn endless(sink: &RowSink<Tuple>) -> Result<(), StreamError> {
    let mut i = 0;
    loop {
        sink.put(Tuple::new_int_tuple(i, 1))?;
        i += 1;
    }
}

#[test]
fn test_all_rows_in_order() {
    setup();

    let rows = new_int_tuples(1000, 2);
    let expected = rows.clone();
    let mut iter = QueueTupleIter::new("rows", &test_config(64), &CancelToken::new(), move |sink| {
        put_all(sink, &rows)
    });

    assert_eq!(read_all(&mut iter).unwrap(), expected);
    assert!(iter.fetch().unwrap().is_end_of_data());
    iter.close();
}

#[test]
fn test_underflow_and_listener() {
    setup();

    let rows = new_int_tuples(10, 1);
    let expected = rows.clone();
    let mut iter = QueueTupleIter::new("slow", &test_config(64), &CancelToken::new(), move |sink| {
        thread::sleep(Duration::from_millis(100));
        put_all(sink, &rows)
    });
    assert!(iter.set_timeout(Some(Duration::from_millis(5)), true));

    assert!(iter.fetch().unwrap().is_underflow());

    let (s, r) = crossbeam::channel::unbounded();
    assert!(iter.add_listener(Box::new(move || {
        s.send(()).unwrap();
    })));
    r.recv_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(read_all(&mut iter).unwrap(), expected);
}

#[test]
fn test_timeout_error() {
    setup();

    let mut iter = QueueTupleIter::new("stuck", &test_config(64), &CancelToken::new(), |sink: &RowSink<Tuple>| {
        while !sink.is_stopped() {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    });
    iter.set_timeout(Some(Duration::from_millis(5)), false);

    let err = iter.fetch().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    iter.close();
}

#[test]
fn test_producer_error() {
    setup();

    let mut iter = QueueTupleIter::new("failing", &test_config(64), &CancelToken::new(), |sink| {
        sink.put(Tuple::new_int_tuple(1, 1))?;
        Err(StreamError::new(ErrorKind::RowTooLong, "upstream failed"))
    });

    assert!(iter.fetch().unwrap().is_row());
    let err = iter.fetch().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RowTooLong);
    assert!(iter.fetch().unwrap().is_end_of_data());
}

#[test]
fn test_restart() {
    setup();

    let runs = Arc::new(AtomicUsize::new(0));
    let hooks = Arc::new(AtomicUsize::new(0));

    let r = Arc::clone(&runs);
    let mut iter = QueueTupleIter::new("endless", &test_config(64), &CancelToken::new(), move |sink| {
        r.fetch_add(1, Ordering::SeqCst);
        endless(sink)
    });
    let h = Arc::clone(&hooks);
    iter.add_restart_hook(Box::new(move || {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    for i in 0..20 {
        let row = iter.fetch().unwrap().row().unwrap().clone();
        assert_eq!(row, Tuple::new_int_tuple(i, 1));
    }

    iter.restart().unwrap();
    assert_eq!(hooks.load(Ordering::SeqCst), 1);

    let row = iter.fetch().unwrap().row().unwrap().clone();
    assert_eq!(row, Tuple::new_int_tuple(0, 1));
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    iter.close();
    iter.close();
    assert_eq!(iter.fetch().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(iter.restart().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn test_cancel() {
    setup();

    let cancel = CancelToken::new();
    let mut iter = QueueTupleIter::new("cancelled", &test_config(64), &cancel, endless);

    assert!(iter.fetch().unwrap().is_row());
    cancel.cancel();

    let err = loop {
        match iter.fetch() {
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
