//! Several cache "sessions" served concurrently by coroutines.
//!
//! Each session executes a little script of parsed commands against a
//! shared storage backend, yielding between commands so the sessions
//! interleave the way connections would on a real server.

use greenrt::Engine;
use greenrt::storage::{Command, MemStorage, Storage};
use std::cell::RefCell;
use std::rc::Rc;

enum Cmd {
    Put(&'static str),
    Get(&'static str),
    Delete(&'static str),
}

impl Command for Cmd {
    fn execute(&self, storage: &mut dyn Storage, argument: &str) -> String {
        match self {
            Cmd::Put(key) => {
                storage.put(key, argument);
                "STORED".to_owned()
            }
            Cmd::Get(key) => match storage.get(key) {
                Some(value) => value,
                None => "NOT_FOUND".to_owned(),
            },
            Cmd::Delete(key) => {
                if storage.delete(key) {
                    "DELETED".to_owned()
                } else {
                    "NOT_FOUND".to_owned()
                }
            }
        }
    }
}

fn main() {
    let store = Rc::new(RefCell::new(MemStorage::new()));

    let scripts: Vec<(&str, Vec<(Cmd, &str)>)> = vec![
        (
            "session-1",
            vec![
                (Cmd::Put("greeting"), "hello"),
                (Cmd::Get("greeting"), ""),
                (Cmd::Delete("greeting"), ""),
            ],
        ),
        (
            "session-2",
            vec![
                (Cmd::Put("answer"), "42"),
                (Cmd::Get("answer"), ""),
                (Cmd::Get("greeting"), ""),
            ],
        ),
    ];

    let mut engine = Engine::new();
    engine
        .start(move |eng| {
            for (name, script) in scripts {
                let store = store.clone();
                eng.spawn(move |eng| {
                    for (cmd, argument) in &script {
                        let reply = cmd.execute(&mut *store.borrow_mut(), argument);
                        println!("[{name}] -> {reply}");
                        eng.yield_now();
                    }
                    println!("[{name}] closed");
                });
            }
        })
        .expect("engine already running");
}
