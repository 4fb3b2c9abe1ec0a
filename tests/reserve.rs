use chrono::{Duration, TimeZone, Utc};
use delayed_worker::{JobBackend, JobSpec, Worker};
use helpers::{PlainPayload, SingletonPayload};

mod helpers;

#[tokio::test]
async fn it_locks_at_most_one_job_per_singleton_queue() {
    helpers::with_test_db(|db| async move {
        db.queue
            .enqueue(&SingletonPayload::new("Q"), JobSpec::default())
            .await
            .expect("Failed to enqueue");
        db.queue
            .enqueue(&SingletonPayload::new("Q"), JobSpec::default())
            .await
            .expect("Failed to enqueue");

        let w1 = helpers::worker("w1");
        let w2 = helpers::worker("w2");

        let first = db
            .queue
            .reserve(&w1, *w1.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w1 to claim a job");
        assert_eq!(first.locked_by(), &Some("w1".to_string()));

        let second = db
            .queue
            .reserve(&w2, *w2.max_run_time())
            .await
            .expect("Failed to reserve");
        assert!(second.is_none());

        let jobs = db.get_jobs().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs.iter().filter(|job| job.locked_at().is_some()).count(),
            1
        );
    })
    .await;
}

#[tokio::test]
async fn it_reclaims_a_job_whose_lock_expired() {
    helpers::with_test_db(|db| async move {
        let job = db
            .queue
            .enqueue(&SingletonPayload::new("Q"), JobSpec::default())
            .await
            .expect("Failed to enqueue");

        let w1 = helpers::worker("w1");
        let w2 = helpers::worker("w2");

        let claimed = db
            .queue
            .reserve(&w1, *w1.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w1 to claim the job");
        assert_eq!(claimed.id(), job.id());

        let ancient = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        db.set_locked_at(*job.id(), ancient).await;

        let reclaimed = db
            .queue
            .reserve(&w2, *w2.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w2 to reclaim the expired lock");
        assert_eq!(reclaimed.id(), job.id());
        assert_eq!(reclaimed.locked_by(), &Some("w2".to_string()));
    })
    .await;
}

#[tokio::test]
async fn it_ignores_failed_siblings_in_a_singleton_queue() {
    helpers::with_test_db(|db| async move {
        db.queue
            .enqueue(&SingletonPayload::new("Q"), JobSpec::default())
            .await
            .expect("Failed to enqueue");
        db.queue
            .enqueue(&SingletonPayload::new("Q"), JobSpec::default())
            .await
            .expect("Failed to enqueue");

        let w1 = helpers::worker("w1");
        let w2 = helpers::worker("w2");

        let first = db
            .queue
            .reserve(&w1, *w1.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w1 to claim a job");
        db.set_failed_at(*first.id(), Utc::now()).await;

        let second = db
            .queue
            .reserve(&w2, *w2.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w2 to claim the surviving sibling");
        assert_ne!(second.id(), first.id());
        assert_eq!(second.locked_by(), &Some("w2".to_string()));
    })
    .await;
}

#[tokio::test]
async fn it_serves_other_queues_while_a_singleton_is_locked() {
    helpers::with_test_db(|db| async move {
        db.queue
            .enqueue(&SingletonPayload::new("Q"), JobSpec::default())
            .await
            .expect("Failed to enqueue");
        db.queue
            .enqueue(
                &PlainPayload { value: 1 },
                JobSpec::builder().queue("other").build(),
            )
            .await
            .expect("Failed to enqueue");

        let w1 = helpers::worker("w1");
        let w2 = helpers::worker("w2");

        let singleton = db
            .queue
            .reserve(&w1, *w1.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w1 to claim the singleton job");
        assert!(singleton.singleton().is_some());

        let other = db
            .queue
            .reserve(&w2, *w2.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected w2 to claim the non-singleton job");
        assert_eq!(other.queue(), &Some("other".to_string()));
        assert!(other.singleton().is_none());
    })
    .await;
}

#[tokio::test]
async fn it_claims_jobs_in_priority_order() {
    helpers::with_test_db(|db| async move {
        for priority in [5, 1, 3] {
            db.queue
                .enqueue(
                    &PlainPayload { value: priority },
                    JobSpec::builder().priority(priority).build(),
                )
                .await
                .expect("Failed to enqueue");
        }

        let mut claimed = Vec::new();
        for name in ["w1", "w2", "w3"] {
            let worker = helpers::worker(name);
            let job = db
                .queue
                .reserve(&worker, *worker.max_run_time())
                .await
                .expect("Failed to reserve")
                .expect("Expected a job for every worker");
            claimed.push(*job.priority());
        }

        assert_eq!(claimed, vec![1, 3, 5]);
    })
    .await;
}

#[tokio::test]
async fn it_honors_the_worker_queue_filter() {
    helpers::with_test_db(|db| async move {
        db.queue
            .enqueue(&PlainPayload { value: 1 }, JobSpec::default())
            .await
            .expect("Failed to enqueue");
        db.queue
            .enqueue(
                &PlainPayload { value: 2 },
                JobSpec::builder().queue("mail").build(),
            )
            .await
            .expect("Failed to enqueue");

        let mail_worker = Worker::builder()
            .name("w1")
            .queues(vec!["mail".to_string()])
            .build();

        let job = db
            .queue
            .reserve(&mail_worker, *mail_worker.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected the mail job");
        assert_eq!(job.queue(), &Some("mail".to_string()));

        let nothing_left = db
            .queue
            .reserve(&mail_worker, *mail_worker.max_run_time())
            .await
            .expect("Failed to reserve");
        assert!(nothing_left.is_none());
    })
    .await;
}

#[tokio::test]
async fn it_honors_the_worker_priority_band() {
    helpers::with_test_db(|db| async move {
        for priority in [3, 10] {
            db.queue
                .enqueue(
                    &PlainPayload { value: priority },
                    JobSpec::builder().priority(priority).build(),
                )
                .await
                .expect("Failed to enqueue");
        }

        let low = Worker::builder().name("w1").max_priority(5).build();
        let high = Worker::builder().name("w2").min_priority(5).build();

        let low_job = db
            .queue
            .reserve(&low, *low.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected a job within the low band");
        assert_eq!(low_job.priority(), &3);

        let high_job = db
            .queue
            .reserve(&high, *high.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected a job within the high band");
        assert_eq!(high_job.priority(), &10);
    })
    .await;
}

#[tokio::test]
async fn it_leaves_future_jobs_alone() {
    helpers::with_test_db(|db| async move {
        db.queue
            .enqueue(
                &PlainPayload { value: 1 },
                JobSpec::builder().run_at(Utc::now() + Duration::hours(1)).build(),
            )
            .await
            .expect("Failed to enqueue");

        let worker = helpers::worker("w1");
        let job = db
            .queue
            .reserve(&worker, *worker.max_run_time())
            .await
            .expect("Failed to reserve");
        assert!(job.is_none());
    })
    .await;
}

#[tokio::test]
async fn it_lets_a_worker_re_reserve_its_own_locked_job() {
    helpers::with_test_db(|db| async move {
        db.queue
            .enqueue(&PlainPayload { value: 1 }, JobSpec::default())
            .await
            .expect("Failed to enqueue");

        let worker = helpers::worker("w1");
        let first = db
            .queue
            .reserve(&worker, *worker.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected a job");

        let again = db
            .queue
            .reserve(&worker, *worker.max_run_time())
            .await
            .expect("Failed to reserve")
            .expect("Expected the held job again");
        assert_eq!(again.id(), first.id());
    })
    .await;
}
