mod test_utils;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use small_stream::buffer::{Buffer, BufferPool, PoolStats};
use test_utils::setup;

fn new_pool(count: usize) -> Arc<BufferPool> {
    let pool = Arc::new(BufferPool::new("test-pool"));
    pool.open(Buffer::allocate(count, 64));
    pool
}

fn stats(free: usize, queued: usize, active: usize, capacity: usize) -> PoolStats {
    PoolStats {
        free,
        queued,
        active,
        capacity,
    }
}

fn write(buffer: &mut Buffer, len: usize) {
    assert!(buffer.put_slice(&vec![7; len]));
}

#[test]
fn test_transitions() {
    setup();

    let pool = new_pool(3);
    assert_eq!(pool.stats(), stats(3, 0, 0, 3));

    let mut a = pool.acquire_free_buffer(false).unwrap();
    assert_eq!(pool.stats(), stats(2, 0, 1, 3));
    write(&mut a, 8);
    pool.publish(a);
    assert_eq!(pool.stats(), stats(2, 1, 0, 3));

    let b = pool.acquire_filled_buffer(false).unwrap();
    assert_eq!(b.position(), 0);
    assert_eq!(b.limit(), 8);
    assert_eq!(pool.stats(), stats(2, 0, 1, 3));

    // writer and reader both active
    let c = pool.acquire_free_buffer(false).unwrap();
    assert_eq!(pool.stats(), stats(1, 0, 2, 3));

    pool.release(b);
    assert_eq!(pool.stats(), stats(2, 0, 1, 3));

    // nothing written, back to the free list
    pool.publish(c);
    assert_eq!(pool.stats(), stats(3, 0, 0, 3));
}

#[test]
fn test_non_blocking_empty() {
    setup();

    let pool = new_pool(1);
    assert!(pool.acquire_filled_buffer(false).is_none());

    let a = pool.acquire_free_buffer(false).unwrap();
    assert!(pool.acquire_free_buffer(false).is_none());
    assert_eq!(pool.stats(), stats(0, 0, 1, 1));
    pool.publish(a);
}

#[test]
fn test_fifo() {
    setup();

    let pool = new_pool(4);
    let mut ids = vec![];
    for len in 1..=4 {
        let mut buffer = pool.acquire_free_buffer(false).unwrap();
        write(&mut buffer, len);
        ids.push(buffer.id());
        pool.publish(buffer);
    }

    for (i, id) in ids.into_iter().enumerate() {
        let buffer = pool.acquire_filled_buffer(false).unwrap();
        assert_eq!(buffer.id(), id);
        assert_eq!(buffer.limit(), i + 1);
        pool.release(buffer);
    }
    assert_eq!(pool.stats(), stats(4, 0, 0, 4));
}

#[test]
fn test_blocking_reader_wakes_on_publish() {
    setup();

    let pool = new_pool(2);
    let (s, r) = crossbeam::channel::unbounded();

    let reader = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let buffer = pool.acquire_filled_buffer(true).unwrap();
            s.send(buffer.limit()).unwrap();
            pool.release(buffer);
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(r.try_recv().is_err());

    let mut buffer = pool.acquire_free_buffer(true).unwrap();
    write(&mut buffer, 12);
    pool.publish(buffer);

    assert_eq!(r.recv_timeout(Duration::from_secs(5)).unwrap(), 12);
    reader.join().unwrap();
    assert_eq!(pool.stats(), stats(2, 0, 0, 2));
}

#[test]
fn test_blocking_reader_wakes_on_eos() {
    setup();

    let pool = new_pool(2);
    let reader = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let buffer = pool.acquire_filled_buffer(true).unwrap();
            let eos = buffer.is_eos();
            pool.release(buffer);
            eos
        })
    };

    thread::sleep(Duration::from_millis(20));
    pool.publish_eos();
    assert!(reader.join().unwrap());
}

#[test]
fn test_blocking_waits_end_on_close() {
    setup();

    let pool = new_pool(1);
    let held = pool.acquire_free_buffer(false).unwrap();

    let writer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire_free_buffer(true).is_none())
    };
    let reader = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire_filled_buffer(true).is_none())
    };

    thread::sleep(Duration::from_millis(20));
    let returned = pool.close();
    assert!(returned.is_empty());
    assert!(writer.join().unwrap());
    assert!(reader.join().unwrap());

    // the held buffer is dropped when it comes back
    assert_eq!(pool.stats(), stats(0, 0, 1, 1));
    pool.publish(held);
    assert_eq!(pool.stats(), stats(0, 0, 0, 0));
}

#[test]
fn test_interrupt_writer() {
    setup();

    let pool = new_pool(1);
    let mut held = pool.acquire_free_buffer(false).unwrap();

    let writer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.acquire_free_buffer(true).is_none())
    };

    thread::sleep(Duration::from_millis(20));
    pool.interrupt_writer();
    assert!(writer.join().unwrap());

    // non-blocking acquires still succeed while interrupted
    write(&mut held, 4);
    pool.publish(held);
    let buffer = pool.acquire_filled_buffer(false).unwrap();
    pool.release(buffer);
    assert!(pool.acquire_free_buffer(false).is_some());
}

#[test]
fn test_pending_eos() {
    setup();

    let pool = new_pool(1);
    let mut buffer = pool.acquire_free_buffer(false).unwrap();
    write(&mut buffer, 4);
    pool.publish(buffer);
    let buffer = pool.acquire_filled_buffer(false).unwrap();

    // no free buffer for the sentinel yet
    pool.publish_eos();
    assert_eq!(pool.stats(), stats(0, 0, 1, 1));

    pool.release(buffer);
    assert_eq!(pool.stats(), stats(0, 1, 0, 1));
    let eos = pool.acquire_filled_buffer(false).unwrap();
    assert!(eos.is_eos());
    pool.release(eos);
    assert_eq!(pool.stats(), stats(1, 0, 0, 1));
}

#[test]
fn test_close_returns_buffers() {
    setup();

    let pool = new_pool(3);
    let mut buffer = pool.acquire_free_buffer(false).unwrap();
    write(&mut buffer, 4);
    pool.publish(buffer);

    let returned = pool.close();
    assert_eq!(returned.len(), 3);
    assert!(!pool.is_open());
    assert!(pool.acquire_free_buffer(false).is_none());
    assert_eq!(pool.stats(), stats(0, 0, 0, 0));
}

#[test]
fn test_reset() {
    setup();

    let pool = new_pool(3);
    for _ in 0..2 {
        let mut buffer = pool.acquire_free_buffer(false).unwrap();
        write(&mut buffer, 4);
        pool.publish(buffer);
    }
    let reading = pool.acquire_filled_buffer(false).unwrap();

    pool.reset();
    assert_eq!(pool.stats(), stats(2, 0, 1, 3));
    pool.release(reading);
    assert_eq!(pool.stats(), stats(3, 0, 0, 3));
}

#[test]
fn test_listener() {
    setup();

    let pool = new_pool(2);
    let fired = Arc::new(AtomicUsize::new(0));

    let f = Arc::clone(&fired);
    pool.add_listener(Box::new(move || {
        f.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    for _ in 0..2 {
        let mut buffer = pool.acquire_free_buffer(false).unwrap();
        write(&mut buffer, 4);
        pool.publish(buffer);
    }
    // once per registration
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // data already there: fires right away
    let f = Arc::clone(&fired);
    pool.add_listener(Box::new(move || {
        f.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_exchange() {
    setup();

    let pool = new_pool(3);
    let count: u32 = 500;

    let writer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            for i in 0..count {
                let mut buffer = pool.acquire_free_buffer(true).unwrap();
                assert!(buffer.put_slice(&i.to_ne_bytes()));
                pool.publish(buffer);
            }
            pool.publish_eos();
        })
    };

    let mut got = vec![];
    loop {
        let buffer = pool.acquire_filled_buffer(true).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.free + stats.queued + stats.active, stats.capacity);
        if buffer.is_eos() {
            pool.release(buffer);
            break;
        }
        got.push(u32::from_ne_bytes([
            buffer.as_slice()[0],
            buffer.as_slice()[1],
            buffer.as_slice()[2],
            buffer.as_slice()[3],
        ]));
        pool.release(buffer);
    }
    writer.join().unwrap();

    assert_eq!(got, (0..count).collect::<Vec<u32>>());
}

#[test]
fn test_timed_acquire() {
    setup();

    let pool = new_pool(1);
    let start = Instant::now();
    assert!(pool
        .acquire_filled_buffer_timeout(Duration::from_millis(20))
        .is_none());
    assert!(start.elapsed() >= Duration::from_millis(20));

    let writer = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut a = pool.acquire_free_buffer(true).unwrap();
            write(&mut a, 4);
            pool.publish(a);
        })
    };

    // woken by the publish, well before the timeout
    let start = Instant::now();
    let b = pool
        .acquire_filled_buffer_timeout(Duration::from_secs(10))
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(b.limit(), 4);
    pool.release(b);
    writer.join().unwrap();

    pool.close();
    assert!(pool
        .acquire_filled_buffer_timeout(Duration::from_secs(10))
        .is_none());
}
