use super::*;

fn halve(n: &u32) -> Result<u32, String> {
    if n % 2 == 0 {
        Ok(n / 2)
    } else {
        Err(format!("{n} is odd"))
    }
}

#[test]
fn test_serial_collects_failures() {
    let result = SerialExecutor.run(vec![2, 3, 4, 5], halve);
    assert_eq!(result.successes, vec![1, 2]);
    assert_eq!(result.num_failures(), 2);
    assert_eq!(result.failures[0].0, 3);
    assert_eq!(result.failures[1].1.to_string(), "5 is odd");
    assert!(!result.all_successful());
}

#[test]
fn test_parallel_preserves_task_order() {
    let tasks: Vec<u32> = (0..200).map(|i| i * 2).collect();
    let result = ParallelExecutor::new(4).run(tasks, halve);
    assert!(result.all_successful());
    assert_eq!(result.successes, (0..200).collect::<Vec<u32>>());
}

#[test]
fn test_panics_are_captured() {
    let result = ParallelExecutor::new(2).run(vec![1u32, 2, 3], |n| {
        if *n == 2 {
            panic!("boom");
        }
        Ok::<u32, String>(*n)
    });
    assert_eq!(result.successes, vec![1, 3]);
    assert_eq!(result.num_failures(), 1);
    let (task, err) = &result.failures[0];
    assert_eq!(*task, 2);
    assert!(matches!(err, TaskError::Panicked(message) if message == "boom"));
}

#[test]
fn test_empty_task_list() {
    let result = ParallelExecutor::new(3).run(Vec::<u32>::new(), halve);
    assert_eq!(result.num_successes(), 0);
    assert!(result.all_successful());
}

#[test]
fn test_executor_selection() {
    assert!(matches!(
        AnyExecutor::new(ExecutorMode::Parallel, 1),
        AnyExecutor::Serial(_)
    ));
    assert!(matches!(
        AnyExecutor::new(ExecutorMode::Serial, 8),
        AnyExecutor::Serial(_)
    ));
    match AnyExecutor::new(ExecutorMode::Parallel, 3) {
        AnyExecutor::Parallel(executor) => assert_eq!(executor.workers(), 3),
        other => panic!("unexpected executor {other:?}"),
    }
    assert_eq!(ParallelExecutor::new(0).workers(), 1);

    let mode: ExecutorMode = serde_json::from_str("\"serial\"").unwrap();
    assert_eq!(mode, ExecutorMode::Serial);
}
