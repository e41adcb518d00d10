//! Two coroutines taking turns on one thread.

use greenrt::Engine;

fn main() {
    let mut engine = Engine::new();
    engine
        .start(|eng| {
            eng.spawn(|eng| {
                for i in 0..3 {
                    println!("[worker] step {i}");
                    eng.yield_now();
                }
                println!("[worker] done");
            });

            for i in 0..3 {
                println!("[main]   step {i}");
                eng.yield_now();
            }
            println!("[main]   done");
        })
        .expect("engine already running");

    println!("all coroutines finished");
}
