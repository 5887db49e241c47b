//! C++ renderings

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use super::{Rendering, Requirement, SupportCode};
use crate::middle::ir::BuiltinOperator;

use SupportCode::*;

const CMATH: Requirement = Requirement::Include("<cmath>");
const STRING: Requirement = Requirement::Include("<string>");

pub(super) fn operator(op: BuiltinOperator) -> Option<Rendering> {
    use BuiltinOperator as Op;
    let rendering = match op {
        Op::BooleanNegation => Rendering::bare(Prefix("!")),
        Op::BitwiseAnd => Rendering::bare(Infix("&")),
        Op::BitwiseOr => Rendering::bare(Infix("|")),
        Op::IsNull => Rendering::core(Call("temper::core::is_null")),
        Op::NotNull => Rendering::core(Template("!temper::core::is_null({0})")),

        Op::DivFltFlt | Op::DivIntInt => Rendering::bare(Infix("/")),
        Op::DivIntIntSafe => Rendering::core(Call("temper::core::div_safe")),
        Op::ModFltFlt => Rendering::with(Call("std::fmod"), CMATH),
        Op::ModIntInt => Rendering::bare(Infix("%")),
        Op::ModIntIntSafe => Rendering::core(Call("temper::core::mod_safe")),
        Op::MinusFlt | Op::MinusInt => Rendering::bare(Prefix("-")),
        Op::MinusFltFlt | Op::MinusIntInt => Rendering::bare(Infix("-")),
        Op::PlusFltFlt | Op::PlusIntInt => Rendering::bare(Infix("+")),
        Op::TimesFltFlt | Op::TimesIntInt => Rendering::bare(Infix("*")),
        Op::PowFltFlt => Rendering::with(Call("std::pow"), CMATH),

        // std::string compares by value
        Op::LtFltFlt | Op::LtIntInt | Op::LtStrStr => Rendering::bare(Infix("<")),
        Op::LeFltFlt | Op::LeIntInt | Op::LeStrStr => Rendering::bare(Infix("<=")),
        Op::GtFltFlt | Op::GtIntInt | Op::GtStrStr => Rendering::bare(Infix(">")),
        Op::GeFltFlt | Op::GeIntInt | Op::GeStrStr => Rendering::bare(Infix(">=")),
        Op::EqFltFlt | Op::EqIntInt | Op::EqStrStr => Rendering::bare(Infix("==")),
        Op::NeFltFlt | Op::NeIntInt | Op::NeStrStr => Rendering::bare(Infix("!=")),
        Op::LtGeneric => Rendering::core(Call("temper::core::generic_lt")),
        Op::LeGeneric => Rendering::core(Call("temper::core::generic_le")),
        Op::GtGeneric => Rendering::core(Call("temper::core::generic_gt")),
        Op::GeGeneric => Rendering::core(Call("temper::core::generic_ge")),
        Op::EqGeneric => Rendering::core(Call("temper::core::generic_eq")),
        Op::NeGeneric => Rendering::core(Template("!temper::core::generic_eq({0}, {1})")),

        Op::CmpFltFlt | Op::CmpIntInt | Op::CmpStrStr => Rendering::core(Call("temper::core::cmp")),
        // no total order over arbitrary objects in the runtime yet
        Op::CmpGeneric => return None,

        Op::StrCat => Rendering::core(Call("temper::core::str_cat")),
        Op::Listify => Rendering::core(Call("temper::core::listify")),
        Op::Print => Rendering::core(Call("temper::core::print")),
        Op::Panic => Rendering::core(Call("temper::core::panic")),
    };
    Some(rendering)
}

pub(super) static CONNECTED: Lazy<IndexMap<&'static str, Rendering>> = Lazy::new(|| {
    IndexMap::from([
        // coroutines
        ("Generator::wrap", Rendering::core(Call("temper::core::make_generator"))),
        ("Async::launch", Rendering::core(Call("temper::core::launch_async"))),
        ("Generator::valueResult", Rendering::core(Call("temper::core::value_result"))),
        ("Generator::doneResult", Rendering::core(Call("temper::core::done_result"))),
        ("Promise::awakeUpon", Rendering::core(Call("temper::core::awake_upon"))),
        ("Promise::result", Rendering::core(Call("temper::core::promise_result"))),
        // failures travel as Bubble<T> return values
        ("Failure::attempt", Rendering::bare(Template("{0}"))),
        ("Failure::isFailure", Rendering::core(Call("temper::core::is_failure"))),
        ("Failure::unwrap", Rendering::core(Call("temper::core::unwrap"))),
        ("Failure::propagate", Rendering::core(Call("temper::core::bubble"))),
        ("Failure::new", Rendering::core(Call("temper::core::bubble"))),
        ("Failure::recover", Rendering::core(Call("temper::core::recover"))),
        // standard library
        ("Console::log", Rendering::core(Call("temper::core::print"))),
        ("String::length", Rendering::bare(MethodCall("size"))),
        ("String::isEmpty", Rendering::bare(MethodCall("empty"))),
        ("String::fromInt", Rendering::with(Call("std::to_string"), STRING)),
        ("Int::toFloat64", Rendering::bare(Template("static_cast<double>({0})"))),
        ("Float64::toInt", Rendering::core(Call("temper::core::to_int_safe"))),
        ("List::length", Rendering::bare(Template("static_cast<int32_t>({0}->size())"))),
        ("List::get", Rendering::bare(Template("{0}->at({1})"))),
        ("List::toList", Rendering::core(Call("temper::core::to_list"))),
        ("ListBuilder::new", Rendering::core(Call("temper::core::new_list_builder"))),
        ("ListBuilder::add", Rendering::bare(Template("{0}->push_back({1})"))),
        ("Map::get", Rendering::core(Call("temper::core::map_get"))),
    ])
});
