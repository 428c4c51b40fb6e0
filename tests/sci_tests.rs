use bp7sec::eid::EndpointID;
use bp7sec::error::SecError;
use bp7sec::keys::MemKeyStore;
use bp7sec::sci::{
    self, bcb_aes_gcm, bib_hmac_sha2, ion_test, mult_check, ScAction, ScRole, ScState,
    SecurityBlock, SopOutcome,
};
use bp7sec::value::{ScValue, ScValueKind};

#[test]
fn registry_lookups() {
    assert_eq!(sci::def_count(), 3);

    let bib = sci::def_find(bib_hmac_sha2::BIB_HMAC_SHA2_ID).expect("BIB context missing");
    assert_eq!(bib.name, "BIB-HMAC-SHA2");
    let bcb = sci::def_find(bcb_aes_gcm::BCB_AES_GCM_ID).expect("BCB context missing");
    assert_eq!(bcb.name, "BCB-AES-GCM");
    assert!(sci::def_find(99).is_none());

    assert_eq!(sci::id_find("BCB-AES-GCM"), Some(2));
    assert_eq!(sci::id_find("ION_TEST_SC"), Some(ion_test::ION_TEST_SC_ID));
    assert_eq!(sci::id_find("NO_SUCH_SC"), None);

    // the test context is site-local and must stay in the negative id range
    assert!(ion_test::ION_TEST_SC_ID < 0);
}

#[test]
fn exec_init_and_teardown() {
    sci::exec_init().expect("contexts failed to initialize");
    sci::exec_teardown();
}

#[test]
fn policy_parm_add_and_print() {
    let def = sci::def_find(bcb_aes_gcm::BCB_AES_GCM_ID).unwrap();
    let mut parms = Vec::new();

    sci::policy_parm_add(&mut parms, def, "key_name", "bcbkey").unwrap();
    sci::policy_parm_add(&mut parms, def, "aes_variant", "1").unwrap();
    assert_eq!(parms.len(), 2);

    // unknown names and non-parameter values are rejected
    assert!(sci::policy_parm_add(&mut parms, def, "bogus", "1").is_err());
    assert!(sci::policy_parm_add(&mut parms, def, "tag", "00ff").is_err());

    let printed = sci::policy_parm_print(def, &parms);
    assert_eq!(printed, "key_name=bcbkey,aes_variant=1");
}

#[test]
fn parameter_merge_block_wins_over_policy() {
    let def = sci::def_find(bcb_aes_gcm::BCB_AES_GCM_ID).unwrap();
    let keys = MemKeyStore::new();

    let mut policy = Vec::new();
    sci::policy_parm_add(&mut policy, def, "aes_variant", "1").unwrap();
    sci::policy_parm_add(&mut policy, def, "aad_scope", "7").unwrap();

    // a received block asserts aes_variant = 3, shadowing policy's 1
    let blk_parms = vec![ScValue::from_u64(
        ScValueKind::Parm,
        bcb_aes_gcm::PARM_AES_VARIANT,
        3,
    )];

    let state = ScState::init(
        def,
        2,
        ScRole::Acceptor,
        ScAction::Decrypt,
        EndpointID::none(),
        &keys,
        &policy,
        &blk_parms,
        1,
    )
    .unwrap();

    assert_eq!(state.parms.len(), 2);
    let variant = state.parm(bcb_aes_gcm::PARM_AES_VARIANT).unwrap();
    assert_eq!(variant.as_u64(), Some(3));
    // the disjoint policy parameter is still there
    assert!(state.parm(bcb_aes_gcm::PARM_AAD_SCOPE).is_some());
}

#[test]
fn state_role_action_consistency() {
    let def = sci::def_find(bib_hmac_sha2::BIB_HMAC_SHA2_ID).unwrap();
    let keys = MemKeyStore::new();
    let policy = Vec::new();

    let err = ScState::init(
        def,
        2,
        ScRole::Source,
        ScAction::Verify,
        EndpointID::none(),
        &keys,
        &policy,
        &[],
        1,
    )
    .unwrap_err();
    assert!(matches!(err, SecError::RoleActionMismatch(_, _)));

    // BIB-HMAC-SHA2 offers no confidentiality service
    let err = ScState::init(
        def,
        2,
        ScRole::Source,
        ScAction::Encrypt,
        EndpointID::none(),
        &keys,
        &policy,
        &[],
        1,
    )
    .unwrap_err();
    assert!(matches!(err, SecError::ServiceUnsupported(_)));
}

#[test]
fn state_lifecycle() {
    let def = sci::def_find(bib_hmac_sha2::BIB_HMAC_SHA2_ID).unwrap();
    let keys = MemKeyStore::new();
    let mut policy = Vec::new();
    sci::policy_parm_add(&mut policy, def, "sha_variant", "5").unwrap();

    let mut state = ScState::init(
        def,
        2,
        ScRole::Source,
        ScAction::Sign,
        EndpointID::none(),
        &keys,
        &policy,
        &[],
        3,
    )
    .unwrap();

    // init followed immediately by clear must leave a reusable structure
    state.clear();
    assert!(state.parms.is_empty());
    assert!(state.results.is_empty());
    assert!(state.session_key.is_none());

    let mut state = ScState::init(
        def,
        2,
        ScRole::Source,
        ScAction::Sign,
        EndpointID::none(),
        &keys,
        &policy,
        &[],
        3,
    )
    .unwrap();

    state.push_result(ScValue::new(ScValueKind::Result, 1, vec![0xaa]));
    assert_eq!(state.cur_target, 0);

    // each increment advances the cursor and discards the prior results
    state.increment();
    assert_eq!(state.cur_target, 1);
    assert!(state.results.is_empty());
    state.push_result(ScValue::new(ScValueKind::Result, 1, vec![0xbb]));
    state.increment();
    assert_eq!(state.cur_target, 2);
    assert!(state.results.is_empty());

    state.clear();
}

fn sample_policy(def: &sci::ScDef) -> sci::PolicyParms {
    let mut parms = Vec::new();
    sci::policy_parm_add(&mut parms, def, "aes_variant", "3").unwrap();
    sci::policy_parm_add(&mut parms, def, "aad_scope", "7").unwrap();
    parms
}

#[test]
fn mult_check_accepts_matching_reordered_parameters() {
    let def = sci::def_find(bcb_aes_gcm::BCB_AES_GCM_ID).unwrap();
    let local = EndpointID::with_ipn(2, 1).unwrap();
    let policy = sample_policy(def);
    let asb = SecurityBlock::init_outbound(def.id, local.clone(), &policy);

    // same parameters in a different order still merge
    let mut reordered = Vec::new();
    sci::policy_parm_add(&mut reordered, def, "aad_scope", "7").unwrap();
    sci::policy_parm_add(&mut reordered, def, "aes_variant", "3").unwrap();

    assert!(mult_check(&asb, def, &reordered, &local));
}

#[test]
fn mult_check_rejects_mismatches() {
    let bcb = sci::def_find(bcb_aes_gcm::BCB_AES_GCM_ID).unwrap();
    let bib = sci::def_find(bib_hmac_sha2::BIB_HMAC_SHA2_ID).unwrap();
    let local = EndpointID::with_ipn(2, 1).unwrap();
    let remote = EndpointID::with_ipn(7, 1).unwrap();
    let policy = sample_policy(bcb);
    let asb = SecurityBlock::init_outbound(bcb.id, local.clone(), &policy);

    // different context id fails without inspecting parameters
    assert!(!mult_check(&asb, bib, &policy, &local));

    // a security block sourced elsewhere cannot take more operations
    assert!(!mult_check(&asb, bcb, &policy, &remote));

    // changed parameter content
    let mut changed = Vec::new();
    sci::policy_parm_add(&mut changed, bcb, "aes_variant", "1").unwrap();
    sci::policy_parm_add(&mut changed, bcb, "aad_scope", "7").unwrap();
    assert!(!mult_check(&asb, bcb, &changed, &local));

    // different parameter count
    let mut fewer = Vec::new();
    sci::policy_parm_add(&mut fewer, bcb, "aes_variant", "3").unwrap();
    assert!(!mult_check(&asb, bcb, &fewer, &local));
}

#[test]
fn outcome_is_copy_comparable() {
    assert_ne!(SopOutcome::Processed, SopOutcome::CheckFailed);
    assert_ne!(SopOutcome::Processed, SopOutcome::Passthrough);
}
