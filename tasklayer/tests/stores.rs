use chrono::{Duration, Utc};
use std::sync::{Arc, atomic::AtomicBool};

use tasklayer::{
    backend::{document_id_filter, key_value_key},
    memory::{InMemoryDocumentStore, InMemoryKeyValueStore},
    prelude::*,
    schema::DATA_TYPE_ATTRIBUTE,
};

/// One store per in-memory backend shape.
fn stores() -> Vec<Store> {
    vec![
        Store::new(Backend::document(InMemoryDocumentStore::new())),
        Store::new(Backend::key_value(InMemoryKeyValueStore::new())),
    ]
}

fn task(title: &str) -> Task {
    Task::new(title, "", Utc::now() + Duration::days(7))
}

async fn insert_tasks(store: &Store, count: usize) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(count);
    for index in 0..count {
        tasks.push(store.tasks.insert(task(&format!("task {index}"))).await.unwrap());
    }
    tasks
}

/// Stores a project record that has no `tasks` list at all.
async fn insert_project_without_tasks(store: &Store) -> Id {
    let id = store.backend().generate_id();

    match store.backend().driver() {
        Driver::Document(driver) => {
            let mut record = document_id_filter(&id).unwrap();
            record.insert("name", "legacy");
            record.insert("description", "");
            driver.insert_one(Table::Projects.name(), record).await.unwrap();
        }
        Driver::KeyValue(driver) => {
            let mut item = key_value_key(&id).unwrap();
            item.insert(DATA_TYPE_ATTRIBUTE, Table::Projects.data_type());
            item.insert("name", "legacy");
            item.insert("description", "");
            driver.put_item(Table::Projects.name(), item).await.unwrap();
        }
    }

    id
}

#[tokio::test]
async fn test_insert_and_get_by_id() {
    for store in stores() {
        let inserted = store.tasks.insert(task("write report")).await.unwrap();
        assert!(!inserted.id.is_empty());

        let loaded = store.tasks.get_by_id(&inserted.id).await.unwrap();
        assert_eq!(loaded.title, "write report");
        assert!(!loaded.completed);
        assert_eq!(loaded.assigned_to, None);
    }
}

#[tokio::test]
async fn test_missing_entities_are_not_found() {
    for store in stores() {
        let missing = store.backend().generate_id();

        assert!(matches!(
            store.tasks.get_by_id(&missing).await,
            Err(StoreError::NotFound(table, _)) if table == "tasks"
        ));
        assert!(matches!(
            store.tasks.complete(&missing).await,
            Err(StoreError::NotFound(..))
        ));
        assert!(matches!(
            store.users.delete(&missing).await,
            Err(StoreError::NotFound(table, _)) if table == "users"
        ));
    }
}

#[tokio::test]
async fn test_update_and_delete() {
    for store in stores() {
        let inserted = store.tasks.insert(task("ship")).await.unwrap();

        store.tasks.complete(&inserted.id).await.unwrap();
        assert!(store.tasks.get_by_id(&inserted.id).await.unwrap().completed);

        store.tasks.delete(&inserted.id).await.unwrap();
        assert!(matches!(
            store.tasks.get_by_id(&inserted.id).await,
            Err(StoreError::NotFound(..))
        ));
        assert!(matches!(
            store.tasks.delete(&inserted.id).await,
            Err(StoreError::NotFound(..))
        ));
    }
}

#[tokio::test]
async fn test_identifying_fields_cannot_be_updated() {
    for store in stores() {
        let inserted = store.tasks.insert(task("pinned")).await.unwrap();

        assert!(matches!(
            store.tasks.update(&inserted.id, Update::set("id", "other")).await,
            Err(StoreError::ImmutableField(field)) if field == "id"
        ));
    }
}

#[tokio::test]
async fn test_add_task_links_both_sides() {
    for store in stores() {
        let project = store.projects.insert(Project::new("launch", "")).await.unwrap();
        let task = store.tasks.insert(task("announce")).await.unwrap();

        store.projects.add_task(&project.id, &task.id).await.unwrap();

        let project = store.projects.get_by_id(&project.id).await.unwrap();
        assert_eq!(project.tasks, vec![task.id.clone()]);

        let task = store.tasks.get_by_id(&task.id).await.unwrap();
        assert_eq!(task.project_id.as_ref(), Some(&project.id));

        let in_project = store
            .tasks
            .get_by_project(&project.id, &Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(in_project.len(), 1);
    }
}

#[tokio::test]
async fn test_add_task_twice_is_rejected() {
    for store in stores() {
        let project = store.projects.insert(Project::new("launch", "")).await.unwrap();
        let task = store.tasks.insert(task("announce")).await.unwrap();

        store.projects.add_task(&project.id, &task.id).await.unwrap();

        assert!(matches!(
            store.projects.add_task(&project.id, &task.id).await,
            Err(StoreError::AlreadyAssociated(..))
        ));
        assert_eq!(
            store.projects.get_by_id(&project.id).await.unwrap().tasks.len(),
            1
        );
    }
}

#[tokio::test]
async fn test_failed_transaction_leaves_no_trace() {
    for store in stores() {
        let project = store.projects.insert(Project::new("launch", "")).await.unwrap();
        let missing = store.backend().generate_id();

        let plan = TransactionPlan::new()
            .with_update(Table::Projects, project.id.clone(), Update::append(fields::TASKS, &missing))
            .with_update(Table::Tasks, missing.clone(), Update::set(fields::PROJECT_ID, &project.id));

        assert!(matches!(
            store.projects.execute_transaction(&plan).await,
            Err(StoreError::NotFound(table, id)) if table == "tasks" && id == missing.to_string()
        ));
        assert!(store.projects.get_by_id(&project.id).await.unwrap().tasks.is_empty());
    }
}

#[tokio::test]
async fn test_transaction_size_is_bounded() {
    for store in stores() {
        let store = Store::new(store.backend().clone().with_max_transaction_items(2));
        let task = store.tasks.insert(task("bounded")).await.unwrap();

        assert!(matches!(
            store.tasks.execute_transaction(&TransactionPlan::new()).await,
            Err(StoreError::InvalidBatchSize(0, 2))
        ));

        let mut plan = TransactionPlan::new();
        for field in ["title", "description", "completed"] {
            plan.push(Table::Tasks, task.id.clone(), Update::set(field, "x"));
        }
        assert!(matches!(
            store.tasks.execute_transaction(&plan).await,
            Err(StoreError::InvalidBatchSize(3, 2))
        ));
        assert_eq!(store.tasks.get_by_id(&task.id).await.unwrap().title, "bounded");
    }
}

#[tokio::test]
async fn test_append_to_missing_list_fails() {
    for store in stores() {
        let project = insert_project_without_tasks(&store).await;
        let task = store.tasks.insert(task("orphan")).await.unwrap();

        assert!(matches!(
            store.projects.update(&project, Update::append(fields::TASKS, &task.id)).await,
            Err(StoreError::FieldNotInitialized(field)) if field == "tasks"
        ));

        let plan = TransactionPlan::new()
            .with_update(Table::Tasks, task.id.clone(), Update::set(fields::PROJECT_ID, &project))
            .with_update(Table::Projects, project.clone(), Update::append(fields::TASKS, &task.id));
        assert!(matches!(
            store.projects.execute_transaction(&plan).await,
            Err(StoreError::FieldNotInitialized(_))
        ));
        assert_eq!(store.tasks.get_by_id(&task.id).await.unwrap().project_id, None);
    }
}

#[tokio::test]
async fn test_pagination_windows() {
    for store in stores() {
        insert_tasks(&store, 25).await;

        for (page, expected) in [(1, 10), (2, 10), (3, 5), (4, 0)] {
            let found = store
                .tasks
                .get_by_completion(None, &Pagination::new(page, 10))
                .await
                .unwrap();
            assert_eq!(found.len(), expected, "page {page}");
        }
    }
}

#[tokio::test]
async fn test_pages_do_not_overlap() {
    for store in stores() {
        insert_tasks(&store, 12).await;

        let first = store.tasks.get_by_completion(None, &Pagination::new(1, 5)).await.unwrap();
        let second = store.tasks.get_by_completion(None, &Pagination::new(2, 5)).await.unwrap();

        assert_eq!(second.len(), 5);
        assert!(first.iter().all(|task| second.iter().all(|other| other.id != task.id)));
    }
}

#[tokio::test]
async fn test_pages_reproduce_the_dataset() {
    for store in stores() {
        let mut expected = insert_tasks(&store, 23)
            .await
            .into_iter()
            .map(|task| task.id)
            .collect::<Vec<_>>();

        let mut seen = Vec::new();
        for page in 1..=5 {
            let found = store
                .tasks
                .get_by_completion(Some(false), &Pagination::new(page, 5))
                .await
                .unwrap();
            seen.extend(found.into_iter().map(|task| task.id));
        }

        assert_eq!(seen.len(), 23);
        seen.sort();
        seen.dedup();
        expected.sort();
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn test_filtered_pages_reproduce_matches() {
    for store in stores() {
        let tasks = insert_tasks(&store, 20).await;
        let mut expected = Vec::new();
        for task in tasks.iter().step_by(2) {
            store.tasks.complete(&task.id).await.unwrap();
            expected.push(task.id.clone());
        }

        let completed = Filter::eq(fields::COMPLETED, true);
        let mut seen = Vec::new();
        let mut fetches = 0;
        for page in 1..=5 {
            let window = store
                .tasks
                .get_page(&completed, &Pagination::new(page, 3))
                .await
                .unwrap();
            assert_eq!(window.items.len(), [3, 3, 3, 1, 0][page as usize - 1], "page {page}");
            assert!(window.items.iter().all(|task| task.completed));

            fetches += window.fetches;
            seen.extend(window.items.into_iter().map(|task| task.id));
        }

        seen.sort();
        seen.dedup();
        expected.sort();
        assert_eq!(seen, expected);

        if let Driver::KeyValue(_) = store.backend().driver() {
            assert!(fetches > 5);
        }
    }
}

#[tokio::test]
async fn test_key_value_missing_task_is_not_created() {
    let driver = InMemoryKeyValueStore::new();
    let store = Store::new(Backend::key_value(driver.clone()));
    let missing = store.backend().generate_id();

    assert!(matches!(
        store.tasks.complete(&missing).await,
        Err(StoreError::NotFound(..))
    ));
    assert!(matches!(
        store.tasks.assign(&missing, &store.backend().generate_id()).await,
        Err(StoreError::NotFound(..))
    ));
    assert_eq!(driver.count("tasks").await, 0);
    assert!(matches!(
        store.tasks.get_by_id(&missing).await,
        Err(StoreError::NotFound(..))
    ));
}

#[tokio::test]
async fn test_non_positive_pagination_uses_defaults() {
    for store in stores() {
        insert_tasks(&store, 15).await;

        let page = store.tasks.get_by_completion(None, &Pagination::new(0, -3)).await.unwrap();

        assert_eq!(page.len(), 10);
    }
}

#[tokio::test]
async fn test_key_value_fetches_grow_with_page() {
    let driver = InMemoryKeyValueStore::new();
    let store = Store::new(Backend::key_value(driver.clone()));
    insert_tasks(&store, 25).await;

    let mut previous = 0;
    for page in 1..=4 {
        driver.reset_page_fetches();
        let window = store
            .tasks
            .get_page(&Filter::empty(), &Pagination::new(page, 10))
            .await
            .unwrap();

        assert_eq!(window.fetches, driver.page_fetches());
        assert!(window.fetches >= previous);
        previous = window.fetches;
    }
    assert_eq!(previous, 3);
}

#[tokio::test]
async fn test_document_pages_take_one_fetch() {
    let store = Store::new(Backend::document(InMemoryDocumentStore::new()));
    insert_tasks(&store, 25).await;

    let window = store
        .tasks
        .get_page(&Filter::empty(), &Pagination::new(3, 10))
        .await
        .unwrap();

    assert_eq!(window.fetches, 1);
    assert_eq!(window.items.len(), 5);
}

#[tokio::test]
async fn test_cancelled_pagination() {
    for store in stores() {
        insert_tasks(&store, 3).await;
        let cancelled = Pagination::new(1, 10).with_cancellation(Arc::new(AtomicBool::new(true)));

        assert!(matches!(
            store.tasks.get_by_completion(None, &cancelled).await,
            Err(StoreError::Cancelled)
        ));
    }
}

#[tokio::test]
async fn test_get_by_assignee() {
    for store in stores() {
        let user = store
            .users
            .insert(User::new("Grace", "Hopper", "grace@example.com", "secret"))
            .await
            .unwrap();
        let other = store.backend().generate_id();
        let tasks = insert_tasks(&store, 4).await;

        for task in &tasks[..3] {
            store.tasks.assign(&task.id, &user.id).await.unwrap();
        }
        store.tasks.assign(&tasks[3].id, &other).await.unwrap();
        store.tasks.complete(&tasks[0].id).await.unwrap();

        let pagination = Pagination::new(1, 10);
        assert_eq!(store.tasks.get_by_assignee(&user.id, None, &pagination).await.unwrap().len(), 3);

        let open = store
            .tasks
            .get_by_assignee(&user.id, Some(false), &pagination)
            .await
            .unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|task| !task.completed && task.assigned_to.as_ref() == Some(&user.id)));

        let done = store
            .tasks
            .get_by_assignee(&user.id, Some(true), &pagination)
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, tasks[0].id);
    }
}

#[tokio::test]
async fn test_conflicting_index_keys_are_rejected() {
    for store in stores() {
        let first = store.backend().generate_id();
        let second = store.backend().generate_id();
        let filter = Filter::eq(fields::ASSIGNED_TO, &first).and(Filter::eq(fields::ASSIGNED_TO, &second));

        assert!(matches!(
            store.tasks.get_many(&filter, &Pagination::new(1, 10)).await,
            Err(StoreError::IncompatibleFilter(field)) if field == "assignedTo"
        ));
    }
}

#[tokio::test]
async fn test_index_key_with_plain_field() {
    for store in stores() {
        let owner = store.backend().generate_id();
        store
            .projects
            .insert(Project::new("alpha", "first").with_owner(owner.clone()))
            .await
            .unwrap();
        store
            .projects
            .insert(Project::new("beta", "second").with_owner(owner.clone()))
            .await
            .unwrap();

        let filter = Filter::eq(fields::USER_ID, &owner).and(Filter::eq(fields::NAME, "beta"));
        let found = store.projects.get_many(&filter, &Pagination::new(1, 10)).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].description, "second");
        assert_eq!(
            store.projects.get_by_owner(&owner, &Pagination::new(1, 10)).await.unwrap().len(),
            2
        );
    }
}

#[tokio::test]
async fn test_users_by_email() {
    for store in stores() {
        let user = store
            .users
            .insert(User::new("Alan", "Turing", "alan@example.com", "hash-1"))
            .await
            .unwrap();
        assert!(user.enabled);
        assert!(!user.is_admin);

        store.users.update_password(&user.id, "hash-2").await.unwrap();

        let found = store.users.get_by_email("alan@example.com").await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.encrypted_password, "hash-2");

        assert!(matches!(
            store.users.get_by_email("nobody@example.com").await,
            Err(StoreError::NotFound(table, key)) if table == "users" && key == "nobody@example.com"
        ));
    }
}

#[tokio::test]
async fn test_auth_sessions() {
    for store in stores() {
        let user = store
            .users
            .insert(User::new("Edsger", "Dijkstra", "ewd@example.com", "hash"))
            .await
            .unwrap();
        let expires = Utc::now() + Duration::hours(4);

        let first = store.auths.insert(Auth::new(user.id.clone(), expires)).await.unwrap();
        let second = store.auths.insert(Auth::new(user.id.clone(), expires)).await.unwrap();
        assert_ne!(first.auth_uuid, second.auth_uuid);

        let found = store.auths.get_by_filter(&first.filter()).await.unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.user_id, user.id);
        assert!(!found.is_expired(Utc::now()));

        store.auths.delete_by_filter(&first.filter()).await.unwrap();

        assert!(matches!(
            store.auths.get_by_filter(&first.filter()).await,
            Err(StoreError::NotFound(table, _)) if table == "auths"
        ));
        assert!(matches!(
            store.auths.delete_by_filter(&first.filter()).await,
            Err(StoreError::NotFound(..))
        ));
        assert_eq!(store.auths.get_by_filter(&second.filter()).await.unwrap().id, second.id);
    }
}

#[tokio::test]
async fn test_auth_lookup_requires_matching_user() {
    for store in stores() {
        let owner = store.backend().generate_id();
        let auth = store
            .auths
            .insert(Auth::new(owner, Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let mut stolen = auth.filter();
        stolen.user_id = store.backend().generate_id();

        assert!(matches!(
            store.auths.get_by_filter(&stolen).await,
            Err(StoreError::NotFound(..))
        ));
    }
}
