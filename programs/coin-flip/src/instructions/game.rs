//! Game instructions: open and settle wagers

use anchor_lang::prelude::*;
use anchor_lang::system_program;
use flip_logic::{check_opening_wager, decide, EscrowRecord, Outcome, SeededRng, SequenceCounter, COIN_FLIP_SEED, VENDOR_SEED};

use crate::error::CoinFlipError;
use crate::state::{to_identity, to_pubkey, CoinFlip, Vendor};

/// Open a wager addressed by the next global game id
#[derive(Accounts)]
pub struct NewCoinFlip<'info> {
    #[account(
        mut,
        seeds = [VENDOR_SEED],
        bump = vendor.bump
    )]
    pub vendor: Account<'info, Vendor>,

    #[account(
        init,
        payer = user,
        space = CoinFlip::LEN,
        seeds = [COIN_FLIP_SEED, vendor.counter.wrapping_add(1).to_le_bytes().as_ref()],
        bump
    )]
    pub coin_flip: Account<'info, CoinFlip>,

    #[account(mut)]
    pub user: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn new_coin_flip(ctx: Context<NewCoinFlip>, wager: u64) -> Result<()> {
    let vendor = &mut ctx.accounts.vendor;

    let mut counter = SequenceCounter::resume(vendor.counter);
    let id = counter.next().map_err(CoinFlipError::from)?;

    open(
        &mut ctx.accounts.coin_flip,
        &ctx.accounts.user,
        &ctx.accounts.system_program,
        id,
        wager,
        ctx.bumps.coin_flip,
    )?;
    vendor.counter = counter.current();

    msg!("Coin flip {} opened by {} for {} lamports", id, ctx.accounts.user.key(), wager);

    Ok(())
}

/// Open a wager addressed by the initiator and a client nonce
#[derive(Accounts)]
#[instruction(client_nonce: u64)]
pub struct NewNonceCoinFlip<'info> {
    #[account(
        mut,
        seeds = [VENDOR_SEED],
        bump = vendor.bump
    )]
    pub vendor: Account<'info, Vendor>,

    #[account(
        init,
        payer = user,
        space = CoinFlip::LEN,
        seeds = [COIN_FLIP_SEED, user.key().as_ref(), client_nonce.to_le_bytes().as_ref()],
        bump
    )]
    pub coin_flip: Account<'info, CoinFlip>,

    #[account(mut)]
    pub user: Signer<'info>,

    pub system_program: Program<'info, System>,
}

pub fn new_nonce_coin_flip(ctx: Context<NewNonceCoinFlip>, client_nonce: u64, wager: u64) -> Result<()> {
    open(
        &mut ctx.accounts.coin_flip,
        &ctx.accounts.user,
        &ctx.accounts.system_program,
        client_nonce,
        wager,
        ctx.bumps.coin_flip,
    )?;

    // Advisory only; uniqueness comes from the address
    let vendor = &mut ctx.accounts.vendor;
    vendor.counter = vendor.counter.saturating_add(1);

    msg!(
        "Coin flip with nonce {} opened by {} for {} lamports",
        client_nonce,
        ctx.accounts.user.key(),
        wager
    );

    Ok(())
}

/// Join and settle a wager by its global game id
#[derive(Accounts)]
#[instruction(game_id: u64)]
pub struct EndCoinFlip<'info> {
    #[account(
        mut,
        seeds = [COIN_FLIP_SEED, game_id.to_le_bytes().as_ref()],
        bump = coin_flip.bump
    )]
    pub coin_flip: Account<'info, CoinFlip>,

    /// CHECK: must be the stored initiator, receives the pool if they win
    #[account(
        mut,
        address = coin_flip.bet_starter @ CoinFlipError::InitiatorMismatch
    )]
    pub bet_starter: AccountInfo<'info>,

    #[account(mut)]
    pub user: Signer<'info>,

    /// CHECK: SlotHashes sysvar for randomness
    #[account(address = anchor_lang::solana_program::sysvar::slot_hashes::ID)]
    pub slot_hashes: AccountInfo<'info>,

    pub system_program: Program<'info, System>,
}

pub fn end_coin_flip(ctx: Context<EndCoinFlip>, game_id: u64, wager: u64) -> Result<()> {
    let accounts = &mut *ctx.accounts;
    settle(
        &mut accounts.coin_flip,
        &accounts.bet_starter,
        &accounts.user,
        &accounts.slot_hashes,
        &accounts.system_program,
        wager,
    )?;

    msg!("Coin flip {} settled", game_id);

    Ok(())
}

/// Join and settle a wager addressed by initiator and nonce
#[derive(Accounts)]
pub struct EndNonceCoinFlip<'info> {
    #[account(
        mut,
        seeds = [COIN_FLIP_SEED, coin_flip.bet_starter.as_ref(), coin_flip.id.to_le_bytes().as_ref()],
        bump = coin_flip.bump
    )]
    pub coin_flip: Account<'info, CoinFlip>,

    /// CHECK: must be the stored initiator, receives the pool if they win
    #[account(
        mut,
        address = coin_flip.bet_starter @ CoinFlipError::InitiatorMismatch
    )]
    pub bet_starter: AccountInfo<'info>,

    #[account(mut)]
    pub user: Signer<'info>,

    /// CHECK: SlotHashes sysvar for randomness
    #[account(address = anchor_lang::solana_program::sysvar::slot_hashes::ID)]
    pub slot_hashes: AccountInfo<'info>,

    pub system_program: Program<'info, System>,
}

pub fn end_nonce_coin_flip(ctx: Context<EndNonceCoinFlip>, wager: u64) -> Result<()> {
    let accounts = &mut *ctx.accounts;
    settle(
        &mut accounts.coin_flip,
        &accounts.bet_starter,
        &accounts.user,
        &accounts.slot_hashes,
        &accounts.system_program,
        wager,
    )?;

    msg!("Coin flip with nonce {} settled", accounts.coin_flip.id);

    Ok(())
}

fn open<'info>(
    coin_flip: &mut Account<'info, CoinFlip>,
    user: &Signer<'info>,
    system_program: &Program<'info, System>,
    id: u64,
    wager: u64,
    bump: u8,
) -> Result<()> {
    check_opening_wager(wager).map_err(CoinFlipError::from)?;
    check_payer_funds(user, wager)?;

    // Escrow the opening wager in the game account itself
    system_program::transfer(
        CpiContext::new(
            system_program.to_account_info(),
            system_program::Transfer {
                from: user.to_account_info(),
                to: coin_flip.to_account_info(),
            },
        ),
        wager,
    )?;

    let record = EscrowRecord::open(id, to_identity(&user.key()), wager).with_bump(bump);
    coin_flip.store(&record);

    Ok(())
}

fn settle<'info>(
    coin_flip: &mut Account<'info, CoinFlip>,
    bet_starter: &AccountInfo<'info>,
    user: &Signer<'info>,
    slot_hashes: &AccountInfo<'info>,
    system_program: &Program<'info, System>,
    wager: u64,
) -> Result<()> {
    let mut record = coin_flip.to_record()?;
    let counterparty = to_identity(&user.key());

    record.check_join(&counterparty, wager).map_err(CoinFlipError::from)?;
    check_payer_funds(user, wager)?;

    system_program::transfer(
        CpiContext::new(
            system_program.to_account_info(),
            system_program::Transfer {
                from: user.to_account_info(),
                to: coin_flip.to_account_info(),
            },
        ),
        wager,
    )?;

    let outcome = draw_outcome(slot_hashes, record.identifier())?;
    let settlement = record
        .apply_settlement(counterparty, wager, outcome)
        .map_err(CoinFlipError::from)?;

    // The game account must still hold its rent reserve plus the whole pool
    let game_info = coin_flip.to_account_info();
    let rent_floor = Rent::get()?.minimum_balance(game_info.data_len());
    let required = rent_floor
        .checked_add(settlement.total_pool)
        .ok_or(CoinFlipError::Overflow)?;
    require!(game_info.lamports() >= required, CoinFlipError::InsufficientFunds);

    let winner_info = match settlement.outcome {
        Outcome::InitiatorWins => bet_starter.to_account_info(),
        Outcome::CounterpartyWins => user.to_account_info(),
    };
    **game_info.try_borrow_mut_lamports()? -= settlement.total_pool;
    **winner_info.try_borrow_mut_lamports()? += settlement.total_pool;

    coin_flip.store(&record);

    msg!(
        "Winner {} takes {} lamports, loser {}",
        winner_info.key,
        settlement.total_pool,
        to_pubkey(settlement.loser),
    );

    Ok(())
}

/// The payer must cover `wager` and still stay rent exempt afterwards.
fn check_payer_funds(user: &Signer, wager: u64) -> Result<()> {
    let required = payer_requirement(&Rent::get()?, user.data_len(), wager)?;
    require!(user.lamports() >= required, CoinFlipError::InsufficientFunds);
    Ok(())
}

fn payer_requirement(rent: &Rent, payer_data_len: usize, wager: u64) -> Result<u64> {
    let required = rent
        .minimum_balance(payer_data_len)
        .checked_add(wager)
        .ok_or(CoinFlipError::Overflow)?;
    Ok(required)
}

/// Draw the outcome from the most recent slot hash, mixed with the game id.
/// Nothing a participant supplies at settle time enters the seed.
fn draw_outcome(slot_hashes: &AccountInfo, game_id: u64) -> Result<Outcome> {
    let data = slot_hashes.try_borrow_data()?;
    require!(data.len() >= 48, CoinFlipError::SlotHashUnavailable);

    // Skip the vec length (8) and the slot number (8)
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&data[16..48]);

    let mut rng = SeededRng::new(&seed, game_id);
    Ok(decide(&mut rng))
}
