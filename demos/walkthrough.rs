//! Walks through the typical life of a heap: small and growing allocations,
//! reverse-order releases that coalesce, a fragmentation pattern and a stress
//! loop. Run with `RUST_LOG=debug` to see the heap grow.

use std::ptr::NonNull;

use blockalloc::{GrowthProvider, Heap, HeapStats, PageMapper};

fn print_stats(label: &str, stats: HeapStats) {
    println!("\n=== {label} ===");
    println!("Allocations: {}", stats.allocations);
    println!("Releases: {}", stats.releases);
    println!(
        "Chunks: {} ({} bytes), blocks: {} ({} free, {} free bytes, largest {})",
        stats.chunks, stats.heap_bytes, stats.blocks, stats.free_blocks, stats.free_bytes, stats.largest_free
    );
}

fn release_all<G: GrowthProvider>(heap: &mut Heap<G>, ptrs: impl IntoIterator<Item = NonNull<u8>>) {
    for ptr in ptrs {
        unsafe { heap.release(ptr.as_ptr()) };
    }
}

fn simple_pattern<G: GrowthProvider>(heap: &mut Heap<G>) {
    for _ in 0..100 {
        let ptr = heap.allocate(16).expect("16 bytes");
        release_all(heap, [ptr]);
    }

    print_stats("Simple pattern", heap.stats());
}

fn growing_pattern<G: GrowthProvider>(heap: &mut Heap<G>) {
    let ptrs: Vec<_> = (1..=10)
        .map(|i| heap.allocate(16 * i).expect("growing block"))
        .collect();

    // Reverse order lets every block merge into the free one after it.
    release_all(heap, ptrs.into_iter().rev());

    print_stats("Growing pattern", heap.stats());
}

fn fragmentation<G: GrowthProvider>(heap: &mut Heap<G>) {
    let ptrs: Vec<_> = (0..6).map(|_| heap.allocate(128).expect("128 bytes")).collect();

    release_all(heap, ptrs.iter().copied().step_by(2));

    match heap.allocate(384) {
        Ok(ptr) => {
            let reused = ptrs.iter().any(|&hole| hole == ptr);
            println!("384 bytes landed at {ptr:?} (inside a released hole: {reused})");
            release_all(heap, [ptr]);
        }
        Err(err) => println!("384 bytes failed: {err}"),
    }

    release_all(heap, ptrs.iter().copied().skip(1).step_by(2));

    print_stats("Fragmentation", heap.stats());
}

fn edge_cases<G: GrowthProvider>(heap: &mut Heap<G>) {
    match heap.allocate(0) {
        Err(err) => println!("Zero size allocation rejected: {err}"),
        Ok(ptr) => println!("Zero size allocation unexpectedly returned {ptr:?}"),
    }

    let small = heap.allocate(1).expect("1 byte");
    println!("Small allocation (1 byte) returned: {small:?}");

    let large = heap.allocate(1024 * 1024).expect("1 MiB");
    println!("Large allocation (1 MiB) returned: {large:?}");

    release_all(heap, [small, large]);

    print_stats("Edge cases", heap.stats());
}

fn stress<G: GrowthProvider>(heap: &mut Heap<G>) {
    let mut ptrs = Vec::with_capacity(1000);

    for _ in 0..100 {
        ptrs.extend((0..1000).map(|_| heap.allocate(64).expect("64 bytes")));
        release_all(heap, ptrs.drain(..));
    }

    print_stats("Stress", heap.stats());
}

fn main() {
    env_logger::init();

    let mut heap = Heap::new(PageMapper::new());

    let numbers = heap.allocate(5 * size_of::<i32>()).expect("five numbers").cast::<i32>();
    unsafe {
        for i in 0..5 {
            numbers.as_ptr().add(i).write(i as i32 + 1);
        }
        let values: Vec<i32> = (0..5).map(|i| numbers.as_ptr().add(i).read()).collect();
        println!("{values:?}");
    }
    release_all(&mut heap, [numbers.cast()]);

    simple_pattern(&mut heap);
    growing_pattern(&mut heap);
    fragmentation(&mut heap);
    edge_cases(&mut heap);
    stress(&mut heap);

    let stats = heap.stats();
    println!("\nLeaked allocations: {}", stats.allocations - stats.releases);
}
