use kiln::loader::MemoryResolver;
use kiln::{Engine, Map, Template, Value};
use std::sync::Arc;
use std::thread;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_engine_and_templates_are_shareable() {
    assert_send_sync::<Engine>();
    assert_send_sync::<Template>();
}

#[test]
fn test_concurrent_renders_of_one_template() {
    let engine = Engine::default().with_resolver(
        MemoryResolver::new()
            .with("target", "<%page args=\"name, n\"/>\\\n% for i in range(n):\n${name}-${i}\n% endfor\n")
            .with("main", "<%include file=\"target\" args=\"name=name, n=n\"/>"),
    );
    let template: Arc<Template> = engine.load("main").unwrap();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let engine = &engine;
                let template = Arc::clone(&template);
                scope.spawn(move || {
                    let mut context = Map::new();
                    context.insert("name".into(), Value::from(format!("w{worker}")));
                    context.insert("n".into(), Value::from(worker % 3 + 1));
                    (worker, engine.render(template, &context).unwrap())
                })
            })
            .collect();

        for handle in handles {
            let (worker, output) = handle.join().unwrap();
            let expected: String = (0..worker % 3 + 1).map(|i| format!("w{worker}-{i}\n")).collect();
            assert_eq!(output, expected);
        }
    });
    assert_eq!(engine.cache().len(), 2);
}
