//! End-to-end behavior of a repository over a real archive file.

use carvfs_config::testing::TestEnvironment;
use carvfs_ohash::INCOMPLETE;
use carvfs_path::Context;
use carvfs_refcount::Pick;
use carvfs_repo::{Repository, RepositoryOptions};

fn blake2b(data: &[u8]) -> String {
    blake2b_simd::Params::new()
        .hash_length(32)
        .hash(data)
        .to_hex()
        .to_string()
}

fn in_memory(env: &TestEnvironment) -> Repository {
    Repository::open(&env.archive, Context::in_memory(), RepositoryOptions::default()).unwrap()
}

#[test]
fn test_snapshot_read_back_completes_hash() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    let repo = Repository::from_config(&env.config())?;

    let address = repo.snapshot(b"hello world")?;
    assert_eq!(address, "0+11");
    assert_eq!(repo.size(), 11);

    {
        let open = repo.open_carvpath(&address)?;
        assert_eq!(repo.hash_result(&address).as_deref(), Some(INCOMPLETE));
        assert_eq!(open.read(0, 11)?, b"hello world");
        assert_eq!(repo.hash_done(&address), Some(true));
        assert_eq!(repo.hash_result(&address), Some(blake2b(b"hello world")));
    }
    assert_eq!(repo.hash_result(&address), None);

    let lines = env.journal_lines(&env.ohash_log())?;
    assert_eq!(lines, vec![format!("0+11:{}", blake2b(b"hello world"))]);
    Ok(())
}

#[test]
fn test_partial_reads_advance_offset() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(b"0123456789")?;
    let repo = in_memory(&env);

    let open = repo.open_carvpath("2+6")?;
    assert_eq!(open.read(0, 3)?, b"234");
    assert_eq!(repo.hash_offset("2+6"), Some(3));
    // Out of order: nothing hashed
    assert_eq!(open.read(4, 2)?, b"67");
    assert_eq!(repo.hash_offset("2+6"), Some(3));
    // Reads past the end are clipped
    assert_eq!(open.read(3, 100)?, b"567");
    assert_eq!(repo.hash_result("2+6"), Some(blake2b(b"234567")));
    Ok(())
}

#[test]
fn test_sparse_and_fragmented_reads() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(b"abcdefghij")?;
    let repo = in_memory(&env);

    let open = repo.open_carvpath("8+2_S3_0+2")?;
    assert_eq!(open.size(), 7);
    assert_eq!(open.read(0, 7)?, b"ij\0\0\0ab");
    assert_eq!(repo.hash_result("8+2_S3_0+2"), Some(blake2b(b"ij\0\0\0ab")));
    Ok(())
}

#[test]
fn test_new_mutable_write_then_freeze() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(b"0123")?;
    let repo = in_memory(&env);

    let address = repo.new_mutable(8)?;
    assert_eq!(address, "4+8");
    let open = repo.open_carvpath(&address)?;
    assert_eq!(open.write(0, b"abc")?, 3);
    assert_eq!(repo.hash_offset(&address), Some(3));
    assert_eq!(repo.hash_done(&address), Some(false));

    repo.freeze(&address)?;
    assert_eq!(repo.hash_result(&address), Some(blake2b(b"abc\0\0\0\0\0")));
    assert_eq!(open.read(0, 4)?, b"abc\0");
    Ok(())
}

#[test]
fn test_write_is_clipped_to_entity() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(b"..........")?;
    let repo = in_memory(&env);

    let open = repo.open_carvpath("2+2_S2_6+2")?;
    assert_eq!(open.write(0, b"ABCDEFGH")?, 4);
    drop(open);
    assert_eq!(std::fs::read(&env.archive)?, b"..AB..EF..");
    Ok(())
}

#[test]
fn test_grow_and_validity() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(&[0u8; 100])?;
    let repo = in_memory(&env);

    assert!(repo.is_valid("0+100"));
    assert!(!repo.is_valid("50+100"));
    assert!(!repo.is_valid("not-a-path"));

    assert_eq!(repo.grow(100)?, 100);
    assert_eq!(repo.size(), 200);
    assert!(repo.is_valid("50+100"));
    assert_eq!(std::fs::metadata(&env.archive)?.len(), 200);

    assert!(repo.open_carvpath("150+100").is_err());
    Ok(())
}

#[test]
fn test_grow_overflow_is_rejected() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(b"0123456789")?;
    let repo = in_memory(&env);

    assert!(repo.new_mutable(u64::MAX).is_err());
    assert!(repo.grow(u64::MAX - 5).is_err());
    assert_eq!(repo.size(), 10);
    assert_eq!(std::fs::read(&env.archive)?, b"0123456789");
    assert_eq!(repo.grow(1)?, 10);
    Ok(())
}

#[test]
fn test_concurrent_overwrites_hash_bytes_on_disk() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    let repo = in_memory(&env);
    let address = repo.new_mutable(64)?;
    let nested = format!("{}/0+64", address);
    let first = repo.open_carvpath(&address)?;
    let second = repo.open_carvpath(&nested)?;

    std::thread::scope(|scope| {
        for (open, fill) in [(&first, b'A'), (&second, b'B')] {
            scope.spawn(move || {
                let data = vec![fill; 64];
                for _ in 0..200 {
                    assert_eq!(open.write(0, &data).unwrap(), 64);
                }
            });
        }
    });

    let on_disk = std::fs::read(&env.archive)?;
    assert_eq!(on_disk.len(), 64);
    let expected = blake2b(&on_disk);
    assert_eq!(repo.hash_result(&address), Some(expected.clone()));
    assert_eq!(repo.hash_result(&nested), Some(expected));
    Ok(())
}

#[test]
fn test_multi_sync_adopts_foreign_growth() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(&[0u8; 10])?;
    let first = in_memory(&env);
    let second = in_memory(&env);

    let address = second.snapshot(b"from the other side")?;
    assert_eq!(address, "10+19");
    assert_eq!(first.size(), 10);

    // Validation retries after syncing
    assert!(first.is_valid(&address));
    assert_eq!(first.size(), 29);
    assert_eq!(first.multi_sync()?, 0);

    second.grow(5)?;
    assert_eq!(first.multi_sync()?, 5);
    Ok(())
}

#[test]
fn test_refcount_journal() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(&[7u8; 64])?;
    let repo = Repository::from_config(&env.config())?;

    let outer = repo.open_carvpath("0+32")?;
    let inner = repo.open_carvpath("16+32")?;
    drop(inner);
    drop(outer);

    let lines = env.journal_lines(&env.refcount_log())?;
    let records: Vec<&str> = lines
        .iter()
        .map(|line| line.split_once(':').map(|(_, rest)| rest).unwrap())
        .collect();
    assert_eq!(records, vec!["+:0+32", "+:32+16", "-:32+16", "-:0+32"]);
    Ok(())
}

#[test]
fn test_throttle_and_advisory_info() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(&[0u8; 100])?;
    let repo = in_memory(&env);

    assert_eq!(repo.throttle_info(), (0, 100));
    let open = repo.open_carvpath("0+40")?;
    assert_eq!(repo.volume(), 40);
    assert_eq!(repo.throttle_info(), (40, 60));
    assert_eq!(repo.advisory_info("30+20")?, (10, 10));

    drop(open);
    assert_eq!(repo.volume(), 0);
    assert_eq!(repo.throttle_info(), (0, 100));
    Ok(())
}

#[test]
fn test_best_pick() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    env.write_archive(&[0u8; 300])?;
    let repo = in_memory(&env);

    let _a = repo.open_carvpath("0+100")?;
    let _b = repo.open_carvpath("200+10")?;
    assert_eq!(
        repo.best("S", ["0+100", "200+10"])?,
        Some(Pick::Address("200+10".to_string()))
    );
    assert_eq!(
        repo.best("O", ["0+100", "200+10"])?,
        Some(Pick::Address("0+100".to_string()))
    );
    assert_eq!(repo.best("K", ["0+100"])?, Some(Pick::Kickstart));
    assert_eq!(repo.best("S", Vec::<String>::new())?, None);
    assert!(repo.best("S", ["5+5"]).is_err());
    Ok(())
}

#[test]
fn test_flatten_and_long_paths() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;
    let address = {
        let repo = Repository::from_config(&env.config())?;
        assert_eq!(repo.flatten("10+100", "5+10")?, "15+10");

        repo.grow(10_000)?;
        let long: Vec<String> = (0..40).map(|i| format!("{}+1", i * 2)).collect();
        let long = long.join("_");
        let address = repo.flatten("0+10000", &long)?;
        assert!(address.starts_with('D'));
        assert!(repo.is_valid(&address));
        address
    };

    // The long-path map outlives the repository
    let repo = Repository::from_config(&env.config())?;
    let open = repo.open_carvpath(&address)?;
    assert_eq!(open.size(), 40);
    Ok(())
}
