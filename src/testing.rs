//! Provers, signers and ledger fixtures for the tests. Everything here plays the roles the
//! audit only ever observes: the voter, the blind signature issuer, the decryption
//! authorities and the contract that writes the ledger.
use crate::{
    arithmetics::{uint_from_be, Point, Scalar},
    ballot::{Bulletin, BulletinQuestion, Ciphertext, CiphertextGrid, Dimension, SlotProof, VOTE_PARAM},
    hash::{base_hash, binding_coefficient, hash_to_scalar},
    keys::{uint_from_be_padded, RsaInt, RsaKey, TeZhuKey},
    ledger::{DataValue, Transaction},
    proofs::{
        ballot::OPTION_CANDIDATES,
        decryption::{Decryption, DecryptionShare, DleqProof, DleqStatement},
    },
    signatures::BLIND_SIGNATURE_PARAM,
    state::{
        VotingBase, COMMISSION_DECRYPTION, COMMISSION_KEY, DKG_KEY, MAIN_KEY, RESULTS, VOTING_BASE,
    },
    BigInt,
};
use base64::{engine::general_purpose, Engine as _};
use crypto_bigint::{
    modular::runtime_mod::{DynResidue, DynResidueParams},
    Encoding, U512,
};
use rand::Rng;
use serde_json::{json, Value};

pub fn random_scalar() -> Scalar {
    let mut rng = rand::thread_rng();
    loop {
        let bytes: [u8; 32] = rng.gen();
        let scalar = Scalar::new(&BigInt::from_be_slice(&bytes));
        if scalar != Scalar::ZERO {
            return scalar;
        }
    }
}

fn scalar_bytes_le(scalar: &Scalar) -> [u8; 32] {
    return scalar.retrieve().to_le_bytes();
}

/// Sign a digest with GOST R 34.10-2012; the signature is s || r
pub fn sign_gost(secret: &Scalar, digest: &[u8]) -> [u8; 64] {
    let mut e = Scalar::new(&uint_from_be(digest));
    if e == Scalar::ZERO {
        e = Scalar::ONE;
    }
    loop {
        let k = random_scalar();
        let x = match Point::generator().mul_scalar(&k).get_x() {
            Some(x) => x,
            None => continue,
        };
        let r = Scalar::new(&x);
        if r == Scalar::ZERO {
            continue;
        }
        let s = r.mul(secret).add(&k.mul(&e));
        if s == Scalar::ZERO {
            continue;
        }
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&s.retrieve().to_be_bytes());
        out[32..].copy_from_slice(&r.retrieve().to_be_bytes());
        return out;
    }
}

pub fn gost_keypair() -> (Scalar, Point) {
    let secret = random_scalar();
    return (secret, Point::generator().mul_scalar(&secret));
}

/// Base58 of x || y, both big-endian, as senders are identified on the ledger
pub fn sender_address(key: &Point) -> String {
    let raw = key.to_le_bytes();
    let mut bytes = Vec::with_capacity(64);
    bytes.extend(raw[..32].iter().rev());
    bytes.extend(raw[32..].iter().rev());
    return bs58::encode(bytes).into_string();
}

pub fn default_contract_id() -> String {
    return bs58::encode([7u8; 32]).into_string();
}

/// An unsigned transaction calling `operation`
pub fn transaction(id: &str, operation: &str) -> Transaction {
    return Transaction {
        id: id.to_string(),
        tx_type: 104,
        version: 4,
        timestamp: 1_700_000_000_000,
        sender_public_key: String::new(),
        fee: 0,
        fee_asset_id: String::new(),
        signature: String::new(),
        params: vec![(
            "operation".to_string(),
            DataValue::String(operation.to_string()),
        )],
        diff: Vec::new(),
        extra: json!({}),
        operation: operation.to_string(),
        contract_id: default_contract_id(),
        valid: false,
    };
}

pub fn sign_transaction(tx: &mut Transaction, secret: &Scalar) {
    let body = tx.body_bytes().unwrap();
    let digest = base_hash(&[&body]);
    tx.signature = bs58::encode(sign_gost(secret, &digest)).into_string();
}

pub fn signed_transaction(secret: &Scalar, key: &Point, id: &str, operation: &str) -> Transaction {
    let mut tx = transaction(id, operation);
    tx.sender_public_key = sender_address(key);
    tx.fee = 1_000_000;
    tx.params.push(("note".to_string(), DataValue::Int(-3)));
    tx.params.push(("flag".to_string(), DataValue::Bool(true)));
    tx.params.push(("blob".to_string(), DataValue::Binary(vec![1, 2, 3])));
    sign_transaction(&mut tx, secret);
    return tx;
}

fn entries_json(entries: &[(String, DataValue)]) -> Value {
    return Value::Array(
        entries
            .iter()
            .map(|(key, value)| match value {
                DataValue::Int(int) => json!({ "key": key, "intValue": int }),
                DataValue::Bool(flag) => json!({ "key": key, "boolValue": flag }),
                DataValue::Binary(bytes) => json!({
                    "key": key,
                    "binaryValue": format!("base64:{}", general_purpose::STANDARD.encode(bytes)),
                }),
                DataValue::String(text) => json!({ "key": key, "stringValue": text }),
            })
            .collect(),
    );
}

/// Export a transaction in the ledger's line format
pub fn to_line(tx: &Transaction) -> String {
    return format!(
        "0;{};{};{};{};{};{};{};{};{};{};{}",
        tx.id,
        tx.tx_type,
        tx.signature,
        tx.version,
        tx.timestamp,
        tx.sender_public_key,
        tx.fee,
        tx.fee_asset_id,
        entries_json(&tx.params),
        entries_json(&tx.diff),
        tx.extra
    );
}

/// Issuer of TeZhu blind signatures, holding x and z with Q = xG and Z = zG
pub struct TeZhuSigner {
    x: Scalar,
    z: Scalar,
    key: TeZhuKey,
}

impl TeZhuSigner {
    pub fn random() -> Self {
        let x = random_scalar();
        let z = random_scalar();
        let g = Point::generator();
        let key = TeZhuKey::new(g.mul_scalar(&x), g.mul_scalar(&z));
        return Self { x, z, key };
    }

    pub fn get_key(&self) -> &TeZhuKey {
        &self.key
    }

    /// Produce (c, s, y, t) with A = uG and C = vG for fresh u and v:
    /// t = v - yz and s = u + ycx satisfy both verification equations
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let g = Point::generator();
        let u = random_scalar();
        let v = random_scalar();
        let mut transcript = Vec::new();
        transcript.extend_from_slice(&g.mul_scalar(&u).to_le_bytes());
        transcript.extend_from_slice(&g.mul_scalar(&v).to_le_bytes());
        transcript.extend_from_slice(message);
        let c = hash_to_scalar(&transcript);

        let y = random_scalar();
        let t = v.sub(&y.mul(&self.z));
        let s = u.add(&y.mul(&c).mul(&self.x));

        let mut out = Vec::with_capacity(128);
        for scalar in [c, s, y, t] {
            out.extend_from_slice(&scalar_bytes_le(&scalar));
        }
        return out;
    }
}

/// A 1024-bit RSA key with public exponent 65537, and its private exponent
pub fn rsa_keypair() -> (RsaKey, RsaInt) {
    let e = RsaInt::from_u64(65_537);
    loop {
        let p: U512 = crypto_primes::generate_prime(Some(512));
        let q: U512 = crypto_primes::generate_prime(Some(512));
        if p == q {
            continue;
        }
        let p = uint_from_be_padded::<{ RsaInt::LIMBS }>(&p.to_be_bytes()).unwrap();
        let q = uint_from_be_padded::<{ RsaInt::LIMBS }>(&q.to_be_bytes()).unwrap();
        let n = p.wrapping_mul(&q);
        let phi = p
            .wrapping_sub(&RsaInt::ONE)
            .wrapping_mul(&q.wrapping_sub(&RsaInt::ONE));
        let (d, invertible) = e.inv_mod(&phi);
        if invertible.into() {
            return (RsaKey::new(n, e), d);
        }
    }
}

pub fn sign_rsa(key: &RsaKey, d: &RsaInt, message: &[u8]) -> Vec<u8> {
    let digest = uint_from_be_padded::<{ RsaInt::LIMBS }>(&base_hash(&[message])).unwrap();
    let params = DynResidueParams::new(key.get_n());
    let signature = DynResidue::new(&digest, params)
        .pow_bounded_exp(d, d.bits())
        .retrieve();
    return signature
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|byte| *byte == 0)
        .collect();
}

pub fn voting_base_tezhu(key: &TeZhuKey, dimension: &str) -> VotingBase {
    let json = format!(
        r#"{{"pollId":"poll","dimension":{},"blindSigType":"TeZhu","blindSigParams":["{}"]}}"#,
        dimension,
        key.to_hex()
    );
    return serde_json::from_str(&json).unwrap();
}

/// Encrypt m with randomness r under `key` and prove that m is one of `candidates`. When m
/// is not a candidate every branch is simulated and the proof does not verify.
pub fn prove_ciphertext(key: &Point, m: u64, r: &Scalar, candidates: &[u64]) -> SlotProof {
    let g = Point::generator();
    let a = g.mul_scalar(r);
    let b = key.mul_scalar(r) + g.mul(&BigInt::from_u64(m));
    let real = candidates.iter().position(|candidate| *candidate == m);
    let w = random_scalar();

    let mut slot = SlotProof {
        ciphertext: Ciphertext::new(a, b),
        commitments_a: Vec::with_capacity(candidates.len()),
        commitments_b: Vec::with_capacity(candidates.len()),
        challenges: Vec::with_capacity(candidates.len()),
        responses: Vec::with_capacity(candidates.len()),
    };
    for (i, candidate) in candidates.iter().enumerate() {
        if Some(i) == real {
            slot.commitments_a.push(g.mul_scalar(&w));
            slot.commitments_b.push(key.mul_scalar(&w));
            slot.challenges.push(Scalar::ZERO);
            slot.responses.push(Scalar::ZERO);
        } else {
            let c = random_scalar();
            let z = random_scalar();
            let shifted = b - g.mul(&BigInt::from_u64(*candidate));
            slot.commitments_a.push(g.mul_scalar(&z) - a.mul_scalar(&c));
            slot.commitments_b.push(key.mul_scalar(&z) - shifted.mul_scalar(&c));
            slot.challenges.push(c);
            slot.responses.push(z);
        }
    }

    if let Some(j) = real {
        let others = slot
            .challenges
            .iter()
            .fold(Scalar::ZERO, |acc, share| acc.add(share));
        let c = slot.expected_challenge(key).sub(&others);
        slot.challenges[j] = c;
        slot.responses[j] = w.add(&c.mul(r));
    }
    return slot;
}

/// Encrypt m with fresh randomness; the randomness is returned for sum proofs
pub fn prove_slot(key: &Point, m: u64, candidates: &[u64]) -> (SlotProof, Scalar) {
    let r = random_scalar();
    return (prove_ciphertext(key, m, &r, candidates), r);
}

/// A bulletin with one row of 0/1 choices per question
pub fn make_bulletin(key: &Point, dimension: &Dimension, choices: &[Vec<u64>]) -> Bulletin {
    let mut questions = Vec::new();
    for (shape, row) in dimension.get_questions().iter().zip(choices) {
        let mut options = Vec::with_capacity(row.len());
        let mut total = 0;
        let mut randomness = Scalar::ZERO;
        for m in row {
            let (slot, r) = prove_slot(key, *m, &OPTION_CANDIDATES);
            options.push(slot);
            total += m;
            randomness = randomness.add(&r);
        }
        let sum = prove_ciphertext(key, total, &randomness, &shape.sum_candidates());
        questions.push(BulletinQuestion { options, sum });
    }
    return Bulletin::new(questions);
}

pub fn prove_dleq(ctx: &[u8], statement: &DleqStatement, x: &Scalar) -> DleqProof {
    let k = random_scalar();
    let u1 = statement.g1.mul_scalar(&k);
    let u2 = statement.g2.mul_scalar(&k);
    let v = statement.challenge(ctx, &u1, &u2);
    return DleqProof {
        w: k.add(&v.mul(x)),
        u1,
        u2,
    };
}

/// Partially decrypt every option of a tally with secret x, with proofs
pub fn decrypt(ctx: &[u8], sums: &CiphertextGrid, x: &Scalar) -> Decryption {
    let key = Point::generator().mul_scalar(x);
    let shares = sums
        .get_rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|sum| {
                    let statement = DleqStatement {
                        g1: sum.a,
                        y1: sum.a.mul_scalar(x),
                        g2: Point::generator(),
                        y2: key,
                    };
                    DecryptionShare {
                        p: statement.y1,
                        proof: prove_dleq(ctx, &statement, x),
                    }
                })
                .collect()
        })
        .collect();
    return Decryption::new(shares);
}

fn point_hex(point: &Point) -> String {
    return hex::encode(point.to_compressed().unwrap());
}

/// The published JSON form of a decryption
pub fn decryption_json(decryption: &Decryption) -> String {
    let rows: Vec<Value> = decryption
        .get_option_counts()
        .iter()
        .enumerate()
        .map(|(q, options)| {
            Value::Array(
                (0..*options)
                    .map(|o| {
                        let share = decryption.get(q, o).unwrap();
                        json!({
                            "P": point_hex(&share.p),
                            "w": hex::encode(share.proof.w.retrieve().to_be_bytes()),
                            "U1": point_hex(&share.proof.u1),
                            "U2": point_hex(&share.proof.u2),
                        })
                    })
                    .collect(),
            )
        })
        .collect();
    return Value::Array(rows).to_string();
}

pub struct Voter {
    secret: Scalar,
    address: String,
}

/// A complete poll: organiser, blind signature issuer and the two decryption authorities
pub struct Election {
    contract_id: String,
    poll_id: String,
    dimension: Dimension,
    organiser: Voter,
    signer: TeZhuSigner,
    master_secret: Scalar,
    commission_secret: Scalar,
    master_key: Point,
    commission_key: Point,
    main_key: Point,
}

impl Election {
    pub fn new(dimension: &str) -> Self {
        let contract: [u8; 32] = rand::thread_rng().gen();
        let master_secret = random_scalar();
        let commission_secret = random_scalar();
        let master_key = Point::generator().mul_scalar(&master_secret);
        let commission_key = Point::generator().mul_scalar(&commission_secret);
        let h1 = binding_coefficient(&master_key, &commission_key).unwrap();
        let h2 = binding_coefficient(&commission_key, &master_key).unwrap();
        return Self {
            contract_id: bs58::encode(contract).into_string(),
            poll_id: "poll-42".to_string(),
            dimension: serde_json::from_str(dimension).unwrap(),
            organiser: Self::new_voter(),
            signer: TeZhuSigner::random(),
            master_secret,
            commission_secret,
            master_key,
            commission_key,
            main_key: master_key.mul_scalar(&h1) + commission_key.mul_scalar(&h2),
        };
    }

    fn new_voter() -> Voter {
        let (secret, key) = gost_keypair();
        return Voter {
            secret,
            address: sender_address(&key),
        };
    }

    pub fn voter(&self) -> Voter {
        return Self::new_voter();
    }

    pub fn get_contract_id(&self) -> &str {
        &self.contract_id
    }

    fn signed(&self, sender: &Voter, id: &str, operation: &str, diff: Vec<(&str, String)>) -> Transaction {
        let mut tx = transaction(id, operation);
        tx.contract_id = self.contract_id.clone();
        tx.sender_public_key = sender.address.clone();
        tx.diff = diff
            .into_iter()
            .map(|(key, value)| (key.to_string(), DataValue::String(value)))
            .collect();
        sign_transaction(&mut tx, &sender.secret);
        return tx;
    }

    /// Contract creation, keys and poll configuration
    pub fn setup_transactions(&self) -> Vec<Transaction> {
        let voting_base = json!({
            "pollId": self.poll_id,
            "dimension": self.dimension,
            "blindSigType": "TeZhu",
            "blindSigParams": [self.signer.get_key().to_hex()],
        });
        let mut create = transaction("create", "createContract");
        create.params.clear();
        create.contract_id = self.contract_id.clone();
        create.sender_public_key = self.organiser.address.clone();
        sign_transaction(&mut create, &self.organiser.secret);

        return vec![
            create,
            self.signed(&self.organiser, "main-key", "addMainKey", vec![(MAIN_KEY, point_hex(&self.main_key))]),
            self.signed(&self.organiser, "dkg-key", "addDKGKey", vec![(DKG_KEY, point_hex(&self.master_key))]),
            self.signed(
                &self.organiser,
                "commission-key",
                "addCommissionKey",
                vec![(COMMISSION_KEY, point_hex(&self.commission_key))],
            ),
            self.signed(&self.organiser, "start", "startVoting", vec![(VOTING_BASE, voting_base.to_string())]),
        ];
    }

    pub fn ballot(&self, choices: &[Vec<u64>]) -> Bulletin {
        return make_bulletin(&self.main_key, &self.dimension, choices);
    }

    fn vote(&self, voter: &Voter, id: &str, bulletin: &Bulletin, blind_signature: Vec<u8>) -> Transaction {
        let mut tx = transaction(id, "vote");
        tx.contract_id = self.contract_id.clone();
        tx.sender_public_key = voter.address.clone();
        tx.params.push((
            VOTE_PARAM.to_string(),
            DataValue::String(general_purpose::STANDARD.encode(bulletin.encode().unwrap())),
        ));
        tx.params.push((
            BLIND_SIGNATURE_PARAM.to_string(),
            DataValue::String(general_purpose::STANDARD.encode(blind_signature)),
        ));
        sign_transaction(&mut tx, &voter.secret);
        return tx;
    }

    /// A vote with a valid blind signature on the voter's key
    pub fn cast(&self, voter: &Voter, id: &str, bulletin: &Bulletin) -> Transaction {
        let signature = self.signer.sign(voter.address.as_bytes());
        return self.vote(voter, id, bulletin, signature);
    }

    /// A vote whose blind signature was issued for somebody else
    pub fn cast_forged(&self, voter: &Voter, id: &str, bulletin: &Bulletin) -> Transaction {
        let signature = self.signer.sign(self.organiser.address.as_bytes());
        return self.vote(voter, id, bulletin, signature);
    }

    /// Both authorities decrypt the sum of the counted ballots and the organiser publishes
    /// `results`
    pub fn finish(&self, counted: &[Bulletin], results: &[Vec<u64>]) -> Vec<Transaction> {
        let grids: Vec<CiphertextGrid> = counted.iter().map(Bulletin::to_grid).collect();
        let sums = CiphertextGrid::sum(&self.dimension.get_option_counts(), &grids).unwrap();
        let ctx = self.poll_id.as_bytes();
        let master = decrypt(ctx, &sums, &self.master_secret);
        let commission = decrypt(ctx, &sums, &self.commission_secret);
        return vec![
            self.signed(
                &self.organiser,
                "decryption",
                "decryption",
                vec![("DECRYPTION_server", decryption_json(&master))],
            ),
            self.signed(
                &self.organiser,
                "commission-decryption",
                "commissionDecryption",
                vec![(COMMISSION_DECRYPTION, decryption_json(&commission))],
            ),
            self.signed(
                &self.organiser,
                "results",
                "results",
                vec![(RESULTS, serde_json::to_string(results).unwrap())],
            ),
        ];
    }
}
